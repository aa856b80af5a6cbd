/*!
Fixtures pour les tests : enregistrements et configurations d'onduleurs
*/

use helios_console::models::{
    InverterConfig, InverterId, InverterRecord, InverterStatus, InverterType, Region,
};

/// Builder d'`InverterRecord` avec des valeurs par défaut réalistes
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: InverterRecord,
}

impl RecordBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            record: InverterRecord {
                id: InverterId::new(id),
                name: format!("Inverter {id}"),
                inverter_type: InverterType::Goodwe,
                region: Region::Au,
                timezone: "Australia/Sydney".to_string(),
                interval_seconds: 300,
                status: InverterStatus::Inactive,
                container_id: None,
                created_at: Some("2024-05-01T09:30:00".to_string()),
                last_update: None,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.record.name = name.to_string();
        self
    }

    pub fn status(mut self, status: InverterStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.record.region = region;
        self
    }

    pub fn container(mut self, container_id: &str) -> Self {
        self.record.container_id = Some(container_id.to_string());
        self
    }

    pub fn build(self) -> InverterRecord {
        self.record
    }
}

/// Configuration de création valide
pub fn sample_config(name: &str) -> InverterConfig {
    let mut config = InverterConfig::new(name, "owner@example.com", "s3cret");
    config.timezone = "Australia/Sydney".to_string();
    config.interval_seconds = 120;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let record = RecordBuilder::new("12")
            .name("Carport")
            .status(InverterStatus::Active)
            .container("abcdef0123456789")
            .build();
        assert_eq!(record.id, InverterId::new("12"));
        assert_eq!(record.short_container_id(), Some("abcdef012345"));

        assert!(sample_config("Carport").validate().is_ok());
    }
}
