//! Resource descriptor attached to every exported signal.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// Semantic-convention attribute keys.
pub const SERVICE_NAME: &str = "service.name";
pub const SERVICE_VERSION: &str = "service.version";
pub const HOST_NAME: &str = "host.name";

/// Build the resource attribute list.
pub fn build_resource_attributes(
    service_name: &str,
    service_version: &str,
    host_name: &str,
) -> Vec<KeyValue> {
    vec![
        KeyValue::new(SERVICE_NAME, service_name.to_string()),
        KeyValue::new(SERVICE_VERSION, service_version.to_string()),
        KeyValue::new(HOST_NAME, host_name.to_string()),
    ]
}

/// Build the resource for the running process.
pub fn build_resource(service_name: &str, service_version: &str, host_name: &str) -> Resource {
    Resource::builder()
        .with_attributes(build_resource_attributes(
            service_name,
            service_version,
            host_name,
        ))
        .build()
}

/// Resolve the current host name.
pub fn current_hostname() -> std::io::Result<String> {
    Ok(hostname::get()?.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_attributes() {
        let attrs = build_resource_attributes("billing", "1.2.0", "node-7");

        let find = |key: &str| {
            attrs
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.as_str().to_string())
        };

        assert_eq!(find(SERVICE_NAME), Some("billing".to_string()));
        assert_eq!(find(SERVICE_VERSION), Some("1.2.0".to_string()));
        assert_eq!(find(HOST_NAME), Some("node-7".to_string()));
    }

    #[test]
    fn test_resource_carries_service_name() {
        let resource = build_resource("billing", "1.2.0", "node-7");

        assert!(
            resource
                .iter()
                .any(|(k, v)| k.as_str() == SERVICE_NAME && v.as_str() == "billing")
        );
    }

    #[test]
    fn test_current_hostname() {
        assert!(!current_hostname().unwrap().is_empty());
    }
}
