//! GraphQL/gRPC/SOAP adapters are typed (see `model::AdapterType`) but not
//! wired to a live client; a `tools/call` against one of these adapter
//! types reports `adapter_not_implemented` instead of panicking or
//! silently succeeding (DESIGN.md Open Question #4).

use crate::error::GatewayError;
use crate::model::AdapterType;

#[derive(Debug, thiserror::Error)]
pub enum PlaceholderError {
    #[error("adapter {0:?} is not implemented")]
    NotImplemented(AdapterType),
}

impl From<PlaceholderError> for GatewayError {
    fn from(e: PlaceholderError) -> Self {
        GatewayError::routing(e.to_string())
    }
}

/// Stands in for `GraphQl`/`GRpc`/`Soap` virtual servers until a live
/// client for one of them is implemented.
pub struct PlaceholderAdapter {
    adapter_type: AdapterType,
}

impl PlaceholderAdapter {
    #[must_use]
    pub fn new(adapter_type: AdapterType) -> Self {
        Self { adapter_type }
    }

    pub fn call(&self) -> Result<serde_json::Value, PlaceholderError> {
        Err(PlaceholderError::NotImplemented(self.adapter_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_adapter_reports_not_implemented() {
        let adapter = PlaceholderAdapter::new(AdapterType::GraphQl);
        assert!(matches!(adapter.call(), Err(PlaceholderError::NotImplemented(AdapterType::GraphQl))));
    }
}
