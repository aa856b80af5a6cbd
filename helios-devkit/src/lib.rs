/*!
# Helios DevKit - Backend simulé et utilitaires de test

Bibliothèque facilitant le test de la console Helios avec:
- Flotte simulée en mémoire (registre + workers) implémentant `FleetApi`
- Serveur HTTP axum exposant la flotte simulée avec le contrat REST
- Fixtures d'onduleurs
- Harness d'intégration
*/

pub mod builders;
pub mod mock_fleet;
pub mod server;
pub mod test_utils;

pub use builders::{sample_config, RecordBuilder};
pub use mock_fleet::{CallKind, MockFleet, RecordedCall};
pub use server::MockServer;
pub use test_utils::TestHarness;
