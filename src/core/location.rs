use async_trait::async_trait;

use crate::{core::geo::LatLng, Error, Result};

/// Source of the user's current position
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<LatLng>;
}

/// Always reports the same position
pub struct FixedLocator(pub LatLng);

#[async_trait]
impl Geolocator for FixedLocator {
    async fn current_position(&self) -> Result<LatLng> {
        Ok(self.0)
    }
}

/// Behaves like a user who denied the location prompt
pub struct DeniedLocator;

#[async_trait]
impl Geolocator for DeniedLocator {
    async fn current_position(&self) -> Result<LatLng> {
        Err(Error::Geolocation("permission denied".into()))
    }
}

/// Resolves the map's starting centre, falling back to `fallback` when the
/// locator fails or reports an out-of-range position
pub async fn initial_center(locator: &dyn Geolocator, fallback: LatLng) -> LatLng {
    match locator.current_position().await {
        Ok(position) if position.is_valid() => position,
        Ok(position) => {
            log::warn!("ignoring invalid geolocation {:?}", position);
            fallback
        }
        Err(e) => {
            log::warn!("geolocation failed, using default centre: {}", e);
            fallback
        }
    }
}
