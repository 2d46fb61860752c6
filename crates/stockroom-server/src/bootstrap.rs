//! Startup seeding of the holder and resource directories.

use crate::config::BootstrapConfig;
use stockroom_core::{HardwareUnit, Holder, SoftwareLicense};
use stockroom_storage::DynAssetStorage;

/// Apply the configured seed records.
///
/// Seeding is idempotent: records are upserted by id, so restarting with the
/// same configuration leaves existing data intact.
pub async fn seed_directories(
    storage: &DynAssetStorage,
    bootstrap: &BootstrapConfig,
) -> anyhow::Result<()> {
    for seed in &bootstrap.holders {
        storage
            .put_holder(Holder::new(&seed.id, &seed.name))
            .await?;
    }
    for seed in &bootstrap.hardware {
        let mut unit = HardwareUnit::new(&seed.id, &seed.name);
        unit.archived = seed.archived;
        storage.put_hardware(unit).await?;
    }
    for seed in &bootstrap.software {
        let mut license = SoftwareLicense::new(&seed.id, &seed.name, seed.total_seats);
        license.archived = seed.archived;
        storage.put_software(license).await?;
    }

    if !bootstrap.holders.is_empty()
        || !bootstrap.hardware.is_empty()
        || !bootstrap.software.is_empty()
    {
        tracing::info!(
            holders = bootstrap.holders.len(),
            hardware = bootstrap.hardware.len(),
            software = bootstrap.software.len(),
            "seed data applied"
        );
    }
    Ok(())
}
