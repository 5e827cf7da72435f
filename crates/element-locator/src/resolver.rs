//! Resolver: strategy chain first, vision fallback last.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use forgehand_core_types::ElementDescriptor;
use platform_adapter::{PlatformDriver, VisionProvider};

use crate::error::LocatorError;
use crate::strategy::selectors_for;
use crate::types::{LocatorConfig, RequiredState, Resolution};

/// Element resolution seam used by the executor.
#[async_trait]
pub trait ElementResolver: Send + Sync {
    async fn resolve(
        &self,
        descriptor: &ElementDescriptor,
        required: RequiredState,
    ) -> Result<Resolution, LocatorError>;
}

/// Chain-then-vision resolver over a [`PlatformDriver`].
pub struct DefaultElementResolver {
    driver: Arc<dyn PlatformDriver>,
    vision: Option<Arc<dyn VisionProvider>>,
    config: LocatorConfig,
}

impl DefaultElementResolver {
    pub fn new(
        driver: Arc<dyn PlatformDriver>,
        vision: Option<Arc<dyn VisionProvider>>,
        config: LocatorConfig,
    ) -> Self {
        Self {
            driver,
            vision,
            config,
        }
    }

    /// Query one selector, recording it in the attempted list.
    async fn try_selector(
        &self,
        selector: &str,
        required: RequiredState,
        attempted: &mut Vec<String>,
    ) -> Result<Option<platform_adapter::ElementHandle>, LocatorError> {
        attempted.push(selector.to_string());
        match self.driver.query(selector).await? {
            Some(handle) if required.is_satisfied_by(&handle) => Ok(Some(handle)),
            Some(_) => {
                debug!(selector, "matched but not in required state");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn vision_fallback(
        &self,
        descriptor: &ElementDescriptor,
        required: RequiredState,
        attempted: &mut Vec<String>,
    ) -> Result<Option<Resolution>, LocatorError> {
        let Some(vision) = &self.vision else {
            return Ok(None);
        };

        let snapshot = self.driver.snapshot().await?;
        let proposals = vision.propose(&snapshot, descriptor).await?;

        let mut considered = 0usize;
        for proposal in proposals {
            if considered >= self.config.max_vision_proposals {
                break;
            }
            if proposal.confidence < self.config.vision_confidence_floor {
                debug!(
                    selector = %proposal.selector,
                    confidence = proposal.confidence,
                    floor = self.config.vision_confidence_floor,
                    "vision proposal below confidence floor"
                );
                continue;
            }
            considered += 1;

            // A proposal only counts if it re-resolves against the live DOM.
            if let Some(handle) = self
                .try_selector(&proposal.selector, required, attempted)
                .await?
            {
                info!(
                    selector = %proposal.selector,
                    confidence = proposal.confidence,
                    "element resolved by vision fallback"
                );
                return Ok(Some(Resolution {
                    handle,
                    strategy: None,
                    vision_confidence: Some(proposal.confidence),
                }));
            }
            warn!(selector = %proposal.selector, "vision proposal did not resolve");
        }
        Ok(None)
    }
}

#[async_trait]
impl ElementResolver for DefaultElementResolver {
    async fn resolve(
        &self,
        descriptor: &ElementDescriptor,
        required: RequiredState,
    ) -> Result<Resolution, LocatorError> {
        let mut attempted = Vec::new();

        for kind in &self.config.chain {
            for selector in selectors_for(*kind, descriptor) {
                if let Some(handle) = self
                    .try_selector(&selector, required, &mut attempted)
                    .await?
                {
                    debug!(
                        strategy = kind.name(),
                        selector, "element resolved structurally"
                    );
                    return Ok(Resolution {
                        handle,
                        strategy: Some(*kind),
                        vision_confidence: None,
                    });
                }
            }
        }

        if let Some(resolution) = self
            .vision_fallback(descriptor, required, &mut attempted)
            .await?
        {
            return Ok(resolution);
        }

        Err(LocatorError::ElementNotFound {
            description: descriptor.description.clone(),
            attempted,
        })
    }
}
