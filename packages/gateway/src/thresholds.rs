//! Per-vehicle decision thresholds.
//!
//! The threshold table maps raw risk-regressor output onto the 0-1
//! scale with the decision boundary pinned at 0.5. It is loaded once
//! from a `Vehicle,threshold` CSV side file; a missing or corrupt file
//! silently falls back to the hardcoded defaults. Lookups always
//! resolve via the `__GLOBAL__` entry.

use std::collections::BTreeMap;
use std::path::Path;

use road_risk_risk_models::VehicleClass;

/// Key for the global default threshold row in the CSV file.
const GLOBAL_KEY: &str = "__GLOBAL__";

/// Immutable per-vehicle threshold table.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    global: f64,
    per_vehicle: BTreeMap<VehicleClass, f64>,
}

impl Default for ThresholdTable {
    /// The hardcoded default set. `Van` is deliberately absent and
    /// resolves through the global entry.
    fn default() -> Self {
        Self {
            global: 0.5,
            per_vehicle: BTreeMap::from([
                (VehicleClass::Motorcycle, 0.45),
                (VehicleClass::ThreeWheeler, 0.48),
                (VehicleClass::Car, 0.50),
                (VehicleClass::Bus, 0.55),
                (VehicleClass::Lorry, 0.52),
            ]),
        }
    }
}

impl ThresholdTable {
    /// Threshold for a vehicle class; always resolves.
    #[must_use]
    pub fn lookup(&self, vehicle: VehicleClass) -> f64 {
        self.per_vehicle.get(&vehicle).copied().unwrap_or(self.global)
    }

    /// Number of explicit per-vehicle entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.per_vehicle.len()
    }

    /// Whether the table carries no explicit per-vehicle entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.per_vehicle.is_empty()
    }

    /// Parses `Vehicle,threshold` CSV content, starting from the
    /// default set so unmapped vehicles keep their defaults.
    ///
    /// Rows with unknown vehicle labels or thresholds outside `[0, 1]`
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a `csv::Error` if the content is not parseable CSV.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut table = Self::default();
        let mut csv_reader = csv::Reader::from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let vehicle_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("vehicle"))
            .unwrap_or(0);
        let threshold_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("threshold"))
            .unwrap_or(1);

        for result in csv_reader.records() {
            let record = result?;
            let Some(label) = record.get(vehicle_idx) else {
                continue;
            };
            let Some(threshold) = record.get(threshold_idx).and_then(|t| t.parse::<f64>().ok())
            else {
                log::warn!("Skipping threshold row for '{label}': unparseable value");
                continue;
            };
            if !(0.0..=1.0).contains(&threshold) {
                log::warn!("Skipping threshold row for '{label}': {threshold} outside [0, 1]");
                continue;
            }

            if label.trim() == GLOBAL_KEY {
                table.global = threshold;
            } else if let Some(vehicle) = VehicleClass::from_label(label) {
                table.per_vehicle.insert(vehicle, threshold);
            } else {
                log::warn!("Skipping threshold row for unknown vehicle '{label}'");
            }
        }

        Ok(table)
    }

    /// Loads the table from a CSV file, falling back to the defaults
    /// (never an error) when the file is absent or malformed.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::File::open(path) {
            Ok(file) => match Self::from_csv_reader(file) {
                Ok(table) => {
                    log::info!(
                        "Loaded {} vehicle thresholds from {}",
                        table.len(),
                        path.display()
                    );
                    table
                }
                Err(e) => {
                    log::warn!(
                        "Malformed threshold file {}: {e}; using defaults",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "Threshold file {} not readable: {e}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_resolves_every_vehicle() {
        let table = ThresholdTable::default();
        assert!((table.lookup(VehicleClass::Motorcycle) - 0.45).abs() < f64::EPSILON);
        assert!((table.lookup(VehicleClass::Car) - 0.50).abs() < f64::EPSILON);
        // Van has no explicit entry: global default applies.
        assert!((table.lookup(VehicleClass::Van) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_human_labels_case_insensitively() {
        let csv = "Vehicle,threshold\nMotor Cycle,0.40\nthree wheeler,0.46\nBus,0.60\n";
        let table = ThresholdTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert!((table.lookup(VehicleClass::Motorcycle) - 0.40).abs() < f64::EPSILON);
        assert!((table.lookup(VehicleClass::ThreeWheeler) - 0.46).abs() < f64::EPSILON);
        assert!((table.lookup(VehicleClass::Bus) - 0.60).abs() < f64::EPSILON);
        // Unmapped vehicles keep their defaults.
        assert!((table.lookup(VehicleClass::Lorry) - 0.52).abs() < f64::EPSILON);
    }

    #[test]
    fn global_row_overrides_default_global() {
        let csv = "Vehicle,threshold\n__GLOBAL__,0.42\n";
        let table = ThresholdTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert!((table.lookup(VehicleClass::Van) - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn skips_unknown_vehicles_and_bad_values() {
        let csv = "Vehicle,threshold\nTractor,0.3\nCar,1.5\nCar,oops\nLorry,0.51\n";
        let table = ThresholdTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert!((table.lookup(VehicleClass::Car) - 0.50).abs() < f64::EPSILON);
        assert!((table.lookup(VehicleClass::Lorry) - 0.51).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let table = ThresholdTable::load(Path::new("does/not/exist.csv"));
        assert_eq!(table, ThresholdTable::default());
    }
}
