//! Connector registry: factory for creating connectors from config.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use xarb_core::config::{ConnectionConfig, ConnectorKind};

use crate::ExchangeConnector;
use crate::replay::ReplayConnector;

/// Create a connector based on the `kind` field in the config.
pub fn create_connector(config: &ConnectionConfig) -> Result<Arc<dyn ExchangeConnector>> {
    match config.kind {
        ConnectorKind::Replay => {
            let path = config
                .replay_path
                .as_deref()
                .ok_or_else(|| anyhow!("replay connection for {} needs replay_path", config.exchange))?;
            let connector = ReplayConnector::from_jsonl(&config.exchange, Path::new(path))?
                .with_interval(config.effective_replay_interval())
                .with_restamp(config.effective_restamp());
            Ok(Arc::new(connector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn builds_replay_connector_from_file() {
        let path = std::env::temp_dir().join(format!("xarb-registry-{}.jsonl", std::process::id()));
        std::fs::write(
            &path,
            "{\"symbol\":\"BTC-USD\",\"bid\":\"1\",\"ask\":\"2\"}\n{\"symbol\":\"BTC-USD\",\"bid\":\"3\",\"ask\":\"4\"}\n",
        )
        .unwrap();

        let config: ConnectionConfig = serde_json::from_value(serde_json::json!({
            "exchange": "gemini",
            "kind": "replay",
            "replay_path": path.to_string_lossy(),
        }))
        .unwrap();
        let connector = create_connector(&config).unwrap();
        assert_eq!(connector.exchange(), "gemini");

        connector.connect().await.unwrap();
        let feed: Vec<_> = connector
            .subscribe_to_pairs(&["BTC-USD".into()])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(feed.len(), 2);
        // restamp defaults on for file replays
        assert!(feed[0].as_ref().unwrap().timestamp_us > 0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_error() {
        let config: ConnectionConfig = serde_json::from_value(serde_json::json!({
            "exchange": "gemini",
            "kind": "replay",
            "replay_path": "/nonexistent/xarb.jsonl",
        }))
        .unwrap();
        let err = create_connector(&config).err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/xarb.jsonl"));
    }
}
