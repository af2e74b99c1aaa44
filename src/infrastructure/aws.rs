use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::config::settings::AppConfig;

/// Loads the shared SDK config: default credential chain plus region and endpoint overrides.
pub async fn load_sdk_config(config: &AppConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()));

    if let Some(endpoint) = &config.aws_endpoint_url {
        info!(endpoint = %endpoint, "Using AWS endpoint override");
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}
