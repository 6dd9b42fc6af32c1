//! # Adapter Registry
//!
//! Explicit mapping from client family to [`SourceFactory`], built once and
//! handed to the orchestrator.
//!
//! Factories are asked in registration order when a manual run needs to
//! figure out which family a source belongs to. The first factory that knows
//! the source wins; the rest are still asked so ambiguous configurations can
//! be reported. A factory that errors is skipped.

use crate::{Result, SyncError};
use bridge_traits::source::{SourceConfig, SourceFactory};
use core_library::models::{SourceId, SourceType};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registered source factories, in registration order
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: Vec<Arc<dyn SourceFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory
    ///
    /// A later factory for an already registered family replaces the earlier
    /// one in place.
    pub fn register(mut self, factory: Arc<dyn SourceFactory>) -> Self {
        let source_type = factory.source_type();
        match self
            .factories
            .iter_mut()
            .find(|f| f.source_type() == source_type)
        {
            Some(slot) => {
                warn!(%source_type, "Replacing registered source factory");
                *slot = factory;
            }
            None => self.factories.push(factory),
        }
        self
    }

    /// Factory registered for a client family
    pub fn factory_for(&self, source_type: SourceType) -> Result<Arc<dyn SourceFactory>> {
        self.factories
            .iter()
            .find(|f| f.source_type() == source_type)
            .cloned()
            .ok_or_else(|| SyncError::AdapterNotRegistered(source_type.to_string()))
    }

    pub fn source_types(&self) -> Vec<SourceType> {
        self.factories.iter().map(|f| f.source_type()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Find which client family a source belongs to
    ///
    /// A factory that fails while being asked is logged and passed over.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceNotFound`] when no factory knows the source and
    ///   at least one answered
    /// - [`SyncError::Source`] with the last factory error when every factory
    ///   failed
    pub async fn detect(&self, source_id: SourceId) -> Result<SourceConfig> {
        let mut found: Option<SourceConfig> = None;
        let mut matches = Vec::new();
        let mut answered = false;
        let mut last_error = None;

        for factory in &self.factories {
            let config = match factory.load_config(source_id).await {
                Ok(config) => {
                    answered = true;
                    config
                }
                Err(e) => {
                    warn!(
                        %source_id,
                        source_type = %factory.source_type(),
                        error = %e,
                        "Source factory failed while probing, trying the next one"
                    );
                    last_error = Some(e);
                    continue;
                }
            };
            let Some(config) = config else {
                continue;
            };
            debug!(%source_id, source_type = %factory.source_type(), "Factory knows source");
            matches.push(factory.source_type());
            if found.is_none() {
                found = Some(config);
            }
        }

        if matches.len() > 1 {
            warn!(
                %source_id,
                candidates = ?matches,
                "Source is known to several client families, using the first"
            );
        }

        match (found, last_error) {
            (Some(config), _) => Ok(config),
            (None, Some(e)) if !answered => Err(SyncError::Source(e)),
            (None, _) => Err(SyncError::SourceNotFound(source_id)),
        }
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("source_types", &self.source_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::source::MediaSource;
    use bridge_traits::BridgeError;
    use mockall::mock;

    mock! {
        Factory {}

        #[async_trait]
        impl SourceFactory for Factory {
            fn source_type(&self) -> SourceType;
            async fn load_config(&self, source_id: SourceId) -> bridge_traits::error::Result<Option<SourceConfig>>;
            async fn connect(&self, config: SourceConfig) -> bridge_traits::error::Result<Arc<dyn MediaSource>>;
        }
    }

    fn config(source_id: SourceId, source_type: SourceType) -> SourceConfig {
        SourceConfig {
            source_id,
            source_type,
            display_name: format!("{} server", source_type),
            base_url: None,
        }
    }

    fn factory(source_type: SourceType, knows: Option<SourceId>) -> Arc<dyn SourceFactory> {
        let mut mock = MockFactory::new();
        mock.expect_source_type().return_const(source_type);
        mock.expect_load_config().returning(move |id| {
            Ok((Some(id) == knows).then(|| config(id, source_type)))
        });
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_detect_first_match_wins() {
        let registry = AdapterRegistry::new()
            .register(factory(SourceType::Jellyfin, None))
            .register(factory(SourceType::Radarr, Some(SourceId(7))))
            .register(factory(SourceType::Plex, Some(SourceId(7))));

        let config = registry.detect(SourceId(7)).await.unwrap();
        assert_eq!(config.source_type, SourceType::Radarr);
    }

    #[tokio::test]
    async fn test_detect_unknown_source() {
        let registry = AdapterRegistry::new().register(factory(SourceType::Jellyfin, None));

        assert!(matches!(
            registry.detect(SourceId(9)).await,
            Err(SyncError::SourceNotFound(SourceId(9)))
        ));
    }

    fn failing(source_type: SourceType) -> Arc<dyn SourceFactory> {
        let mut mock = MockFactory::new();
        mock.expect_source_type().return_const(source_type);
        mock.expect_load_config()
            .returning(|_| Err(BridgeError::OperationFailed("config store offline".to_string())));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_detect_skips_failing_factory() {
        let registry = AdapterRegistry::new()
            .register(failing(SourceType::Plex))
            .register(factory(SourceType::Jellyfin, Some(SourceId(1))));

        let config = registry.detect(SourceId(1)).await.unwrap();
        assert_eq!(config.source_type, SourceType::Jellyfin);
    }

    #[tokio::test]
    async fn test_detect_unknown_source_despite_failing_factory() {
        let registry = AdapterRegistry::new()
            .register(failing(SourceType::Plex))
            .register(factory(SourceType::Jellyfin, None));

        assert!(matches!(
            registry.detect(SourceId(1)).await,
            Err(SyncError::SourceNotFound(SourceId(1)))
        ));
    }

    #[tokio::test]
    async fn test_detect_reports_error_when_every_factory_fails() {
        let registry = AdapterRegistry::new()
            .register(failing(SourceType::Plex))
            .register(failing(SourceType::Emby));

        assert!(matches!(
            registry.detect(SourceId(1)).await,
            Err(SyncError::Source(BridgeError::OperationFailed(_)))
        ));
    }

    #[test]
    fn test_factory_for() {
        let registry = AdapterRegistry::new()
            .register(factory(SourceType::Sonarr, None))
            .register(factory(SourceType::Subsonic, None));

        assert!(registry.factory_for(SourceType::Subsonic).is_ok());
        assert!(matches!(
            registry.factory_for(SourceType::Lidarr),
            Err(SyncError::AdapterNotRegistered(_))
        ));
        assert_eq!(
            registry.source_types(),
            vec![SourceType::Sonarr, SourceType::Subsonic]
        );
    }

    #[test]
    fn test_register_replaces_same_family() {
        let registry = AdapterRegistry::new()
            .register(factory(SourceType::Plex, None))
            .register(factory(SourceType::Plex, Some(SourceId(1))));

        assert_eq!(registry.source_types(), vec![SourceType::Plex]);
    }
}
