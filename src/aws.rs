use aws_config::{defaults, BehaviorVersion, Region, SdkConfig};

use crate::config::AwsConfig;

/// Shared SDK config for every AWS client the process builds.
/// Credentials come from the default provider chain.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader = defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));
    if let Some(endpoint) = &aws.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}
