mod m0001_initial;
mod m0002_unique_identity;
mod m0003_completion_marker;

use cetane::prelude::MigrationRegistry;

pub fn registry() -> MigrationRegistry {
    let mut reg = MigrationRegistry::new();
    reg.register(m0001_initial::migration());
    reg.register(m0002_unique_identity::migration());
    reg.register(m0003_completion_marker::migration());
    reg
}
