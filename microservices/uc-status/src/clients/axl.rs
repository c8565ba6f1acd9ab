//! AXL (Administrative XML) client

use async_trait::async_trait;
use serde_json::{json, Value};

use brivas_uc_health::backend::{ConfiguredDevice, InventoryCounts, ProcessNode};
use brivas_uc_health::{BackendError, ConfigClient, ConfigPayload, DeviceClass};

use super::xml::{self, SoapNamespace};
use super::{endpoint, SoapTransport};

const AXL_PATH: &str = "/axl/";

/// Special node holding cluster-wide settings, never a real server
const ENTERPRISE_NODE: &str = "EnterpriseWideData";

const NODES_SQL: &str = "SELECT name, description, ipv4address, tkprocessnoderole \
     FROM processnode WHERE name NOT LIKE 'Standby%'";

pub struct AxlClient {
    transport: SoapTransport,
    version: String,
    device_limit: u32,
}

impl AxlClient {
    pub fn new(transport: SoapTransport, version: &str, device_limit: u32) -> Self {
        Self {
            transport,
            version: version.to_string(),
            device_limit,
        }
    }

    fn namespace(&self) -> SoapNamespace {
        SoapNamespace {
            prefix: "ns",
            uri: format!("http://www.cisco.com/AXL/API/{}", self.version),
            qualified: false,
        }
    }

    async fn call(&self, host: &str, operation: &str, params: &Value) -> Result<Value, BackendError> {
        let envelope = xml::envelope(&self.namespace(), operation, params);
        let action = format!("\"CUCM:DB ver={} {}\"", self.version, operation);
        self.transport.call(&endpoint(host, AXL_PATH), &action, envelope).await
    }

    /// Rows of an `executeSQLQuery` answer
    async fn sql(&self, host: &str, sql: &str) -> Result<Vec<Value>, BackendError> {
        let body = self.call(host, "executeSQLQuery", &json!({ "sql": sql })).await?;
        Ok(xml::as_list(xml::path(&body, &["executeSQLQueryResponse", "return", "row"]))
            .into_iter()
            .cloned()
            .collect())
    }

    async fn count(&self, host: &str, table: &str) -> Result<u64, BackendError> {
        let rows = self.sql(host, &format!("SELECT COUNT(*) AS cnt FROM {}", table)).await?;
        let Some(row) = rows.first() else {
            return Ok(0);
        };
        // column name case differs between releases
        row.as_object()
            .and_then(|cols| cols.values().next())
            .and_then(Value::as_str)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| BackendError::Malformed(format!("unreadable count for {}", table)))
    }

    fn devices_sql(&self) -> String {
        format!(
            "SELECT FIRST {} d.name, tc.name AS class, dp.name AS pool, tm.name AS model \
             FROM device d \
             LEFT JOIN typeclass tc ON d.tkclass = tc.enum \
             LEFT JOIN devicepool dp ON d.fkdevicepool = dp.pkid \
             LEFT JOIN typemodel tm ON d.tkmodel = tm.enum \
             ORDER BY d.name",
            self.device_limit
        )
    }
}

fn node_role(raw: Option<String>) -> Option<String> {
    raw.map(|r| match r.as_str() {
        "1" => "voice".to_string(),
        "2" => "presence".to_string(),
        _ => r,
    })
}

#[async_trait]
impl ConfigClient for AxlClient {
    async fn version(&self, host: &str) -> Result<String, BackendError> {
        let body = self
            .call(host, "getCCMVersion", &json!({ "processNodeName": "" }))
            .await?;
        xml::path(&body, &["getCCMVersionResponse", "return", "componentVersion"])
            .and_then(|v| xml::text(v, "version"))
            .ok_or_else(|| BackendError::Malformed("getCCMVersion answer has no version".to_string()))
    }

    async fn config_summary(&self, host: &str) -> Result<ConfigPayload, BackendError> {
        let devices_sql = self.devices_sql();
        let (version, users, device_count, trunks, node_rows, device_rows) = tokio::try_join!(
            self.version(host),
            self.count(host, "enduser"),
            self.count(host, "device"),
            self.count(host, "trunk"),
            self.sql(host, NODES_SQL),
            self.sql(host, &devices_sql),
        )?;

        let nodes = node_rows
            .iter()
            .filter_map(|row| {
                let name = xml::text(row, "name")?;
                (name != ENTERPRISE_NODE).then(|| ProcessNode {
                    name,
                    description: xml::text(row, "description"),
                    ipv4_address: xml::text(row, "ipv4address"),
                    role: node_role(xml::text(row, "tkprocessnoderole")),
                })
            })
            .collect();

        let devices = device_rows
            .iter()
            .filter_map(|row| {
                Some(ConfiguredDevice {
                    name: xml::text(row, "name")?,
                    device_class: xml::text(row, "class")
                        .map(|c| DeviceClass::parse_lossy(&c))
                        .unwrap_or(DeviceClass::Unknown),
                    device_pool: xml::text(row, "pool"),
                    model: xml::text(row, "model"),
                })
            })
            .collect();

        Ok(ConfigPayload {
            version,
            counts: InventoryCounts {
                users,
                devices: device_count,
                trunks,
            },
            nodes,
            devices,
        })
    }

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError> {
        self.call(host, operation, &params).await
    }
}
