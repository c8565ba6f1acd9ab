//! RisPort70 (real-time registration) client

use async_trait::async_trait;
use serde_json::{json, Value};

use brivas_uc_health::{BackendError, DeviceClass, DeviceQuery, DeviceState, RealtimeClient, RegistrationStatus};

use super::xml::{self, SoapNamespace};
use super::{endpoint, SoapTransport};

const RIS_PATH: &str = "/realtimeservice2/services/RISService70";

/// Any model
const ANY_MODEL: u32 = 255;

pub struct RisClient {
    transport: SoapTransport,
}

impl RisClient {
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
        self.transport.call(&endpoint(host, RIS_PATH), operation, envelope).await
    }
}

/// `selectCmDevice` request for a device query
pub fn selection_criteria(query: &DeviceQuery) -> Value {
    json!({
        "StateInfo": "",
        "CmSelectionCriteria": {
            "MaxReturnedDevices": query.limit,
            "DeviceClass": query.class.as_str(),
            "Model": ANY_MODEL,
            "Status": "Any",
            "NodeName": "",
            "SelectBy": "Name",
            "SelectItems": { "item": { "Item": query.pattern } },
            "Protocol": "Any",
            "DownloadStatus": "Any",
        }
    })
}

/// Flatten `CmNodes/item/CmDevices/item` into device states
pub fn parse_devices(body: &Value, limit: usize) -> Result<Vec<DeviceState>, BackendError> {
    let result = xml::path(body, &["selectCmDeviceResponse", "selectCmDeviceReturn", "SelectCmDeviceResult"])
        .ok_or_else(|| BackendError::Malformed("selectCmDevice answer has no result".to_string()))?;

    let mut devices = Vec::new();
    for node in xml::as_list(xml::path(result, &["CmNodes", "item"])) {
        let node_name = xml::text(node, "Name");
        for device in xml::as_list(xml::path(node, &["CmDevices", "item"])) {
            let Some(name) = xml::text(device, "Name") else {
                continue;
            };
            let ip_address = xml::as_list(xml::path(device, &["IPAddress", "item"]))
                .into_iter()
                .find_map(|ip| xml::text(ip, "IP"));

            devices.push(DeviceState {
                name,
                device_class: xml::text(device, "DeviceClass")
                    .map(|c| DeviceClass::parse_lossy(&c))
                    .unwrap_or(DeviceClass::Unknown),
                status: xml::text(device, "Status")
                    .map(|s| RegistrationStatus::parse_lossy(&s))
                    .unwrap_or(RegistrationStatus::Unknown),
                node: node_name.clone(),
                ip_address,
                model: xml::text(device, "Model"),
                protocol: xml::text(device, "Protocol"),
            });
            if devices.len() >= limit {
                return Ok(devices);
            }
        }
    }
    Ok(devices)
}

#[async_trait]
impl RealtimeClient for RisClient {
    async fn registered_devices(
        &self,
        host: &str,
        query: &DeviceQuery,
    ) -> Result<Vec<DeviceState>, BackendError> {
        let body = self.call(host, "selectCmDevice", &selection_criteria(query)).await?;
        parse_devices(&body, query.limit as usize)
    }

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError> {
        self.call(host, operation, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
      <soapenv:Body>
        <ns1:selectCmDeviceResponse xmlns:ns1="http://schemas.cisco.com/ast/soap">
          <ns1:selectCmDeviceReturn>
            <ns1:SelectCmDeviceResult>
              <ns1:TotalDevicesFound>2</ns1:TotalDevicesFound>
              <ns1:CmNodes>
                <ns1:item>
                  <ns1:ReturnCode>Ok</ns1:ReturnCode>
                  <ns1:Name>CUCM-PUB</ns1:Name>
                  <ns1:CmDevices>
                    <ns1:item>
                      <ns1:Name>SEP001122334455</ns1:Name>
                      <ns1:DeviceClass>Phone</ns1:DeviceClass>
                      <ns1:Model>36670</ns1:Model>
                      <ns1:Status>Registered</ns1:Status>
                      <ns1:Protocol>SIP</ns1:Protocol>
                      <ns1:IPAddress><ns1:item><ns1:IP>10.10.20.15</ns1:IP></ns1:item></ns1:IPAddress>
                    </ns1:item>
                    <ns1:item>
                      <ns1:Name>SIP_ITSP_PRIMARY</ns1:Name>
                      <ns1:DeviceClass>SIPTrunk</ns1:DeviceClass>
                      <ns1:Status>UnRegistered</ns1:Status>
                    </ns1:item>
                  </ns1:CmDevices>
                </ns1:item>
              </ns1:CmNodes>
            </ns1:SelectCmDeviceResult>
          </ns1:selectCmDeviceReturn>
        </ns1:selectCmDeviceResponse>
      </soapenv:Body>
    </soapenv:Envelope>"#;

    #[test]
    fn test_parse_devices() {
        let body = xml::soap_body(xml::to_json(ANSWER).unwrap()).unwrap();
        let devices = parse_devices(&body, 100).unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].status, RegistrationStatus::Registered);
        assert_eq!(devices[0].ip_address.as_deref(), Some("10.10.20.15"));
        assert_eq!(devices[0].node.as_deref(), Some("CUCM-PUB"));
        assert_eq!(devices[1].device_class, DeviceClass::SipTrunk);
        assert_eq!(devices[1].status, RegistrationStatus::Unregistered);
    }

    #[test]
    fn test_parse_devices_honours_limit() {
        let body = xml::soap_body(xml::to_json(ANSWER).unwrap()).unwrap();
        assert_eq!(parse_devices(&body, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_criteria_for_liveness_query() {
        let criteria = selection_criteria(&DeviceQuery::liveness());
        assert_eq!(criteria["CmSelectionCriteria"]["MaxReturnedDevices"], 1);
        assert_eq!(criteria["CmSelectionCriteria"]["DeviceClass"], "Phone");
        assert_eq!(criteria["CmSelectionCriteria"]["SelectItems"]["item"]["Item"], "%");
    }
}
