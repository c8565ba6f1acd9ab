//! PerfMon (counter sampling) client
//!
//! `perfmonCollectCounterData` returns every counter of one object on one
//! host, so requested counters are grouped by object and each object is
//! collected once.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::{json, Value};

use brivas_uc_health::{BackendError, CounterClient};

use super::xml::{self, SoapNamespace};
use super::{endpoint, SoapTransport};

const PERFMON_PATH: &str = "/perfmonservice2/services/PerfmonService";

pub struct PerfmonClient {
    transport: SoapTransport,
}

impl PerfmonClient {
    pub fn new(transport: SoapTransport) -> Self {
        Self { transport }
    }

    fn namespace() -> SoapNamespace {
        SoapNamespace {
            prefix: "soap",
            uri: "http://schemas.cisco.com/ast/soap".to_string(),
            qualified: true,
        }
    }

    async fn call(&self, host: &str, operation: &str, params: &Value) -> Result<Value, BackendError> {
        let envelope = xml::envelope(&Self::namespace(), operation, params);
        self.transport.call(&endpoint(host, PERFMON_PATH), operation, envelope).await
    }

    async fn collect_object(&self, host: &str, node: &str, object: &str) -> Result<Vec<(String, String)>, BackendError> {
        let body = self
            .call(host, "perfmonCollectCounterData", &json!({ "Host": node, "Object": object }))
            .await?;
        Ok(parse_counter_info(&body))
    }
}

/// Object part of `Object(Instance)\Counter`, without the instance
pub fn object_of(counter: &str) -> Option<&str> {
    let (object, _) = counter.rsplit_once('\\')?;
    let object = object.split('(').next().unwrap_or(object).trim();
    (!object.is_empty()).then_some(object)
}

/// Strip the leading `\\host\` from a returned counter path
pub fn strip_host(path: &str) -> &str {
    path.strip_prefix("\\\\")
        .and_then(|rest| rest.split_once('\\'))
        .map(|(_, counter)| counter)
        .unwrap_or(path)
}

/// (name, value) pairs of a collect answer
pub fn parse_counter_info(body: &Value) -> Vec<(String, String)> {
    let items = xml::path(body, &["perfmonCollectCounterDataResponse", "ArrayOfCounterInfo", "item"])
        .or_else(|| xml::path(body, &["perfmonCollectCounterDataResponse", "ArrayOfCounterInfo", "CounterInfo"]));
    xml::as_list(items)
        .into_iter()
        .filter_map(|item| Some((xml::text(item, "Name")?, xml::text(item, "Value").unwrap_or_default())))
        .collect()
}

#[async_trait]
impl CounterClient for PerfmonClient {
    async fn sample_counters(
        &self,
        host: &str,
        node: &str,
        counters: &[String],
    ) -> Result<BTreeMap<String, f64>, BackendError> {
        let mut objects: Vec<&str> = Vec::new();
        for counter in counters {
            let object = object_of(counter)
                .ok_or_else(|| BackendError::Fault(format!("counter '{}' has no object", counter)))?;
            if !objects.contains(&object) {
                objects.push(object);
            }
        }

        let collected = try_join_all(objects.iter().map(|object| self.collect_object(host, node, object))).await?;

        let mut values = BTreeMap::new();
        for (path, raw) in collected.into_iter().flatten() {
            let name = strip_host(&path);
            if let Some(wanted) = counters.iter().find(|c| c.eq_ignore_ascii_case(name)) {
                let value = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| BackendError::Malformed(format!("counter '{}' value '{}'", name, raw)))?;
                values.insert(wanted.clone(), value);
            }
        }

        if let Some(missing) = counters.iter().find(|c| !values.contains_key(*c)) {
            return Err(BackendError::Fault(format!("counter '{}' not reported by {}", missing, node)));
        }
        Ok(values)
    }

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError> {
        self.call(host, operation, &params).await
    }
}
