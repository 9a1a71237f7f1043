use serde::{Deserialize, Serialize};
use std::fmt;

/// The four tables of the DMV sample ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Table {
    DriversLicense,
    Person,
    Vehicle,
    VehicleRegistration,
}

impl Table {
    /// Every table, in creation order.
    pub const ALL: [Table; 4] = [
        Table::DriversLicense,
        Table::Person,
        Table::Vehicle,
        Table::VehicleRegistration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::DriversLicense => "DriversLicense",
            Table::Person => "Person",
            Table::Vehicle => "Vehicle",
            Table::VehicleRegistration => "VehicleRegistration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexDef {
    pub table: Table,
    pub attribute: &'static str,
}

pub const GOV_ID_INDEX: &str = "GovId";
pub const VIN_INDEX: &str = "VIN";
pub const LICENSE_PLATE_NUMBER_INDEX: &str = "LicensePlateNumber";
pub const PERSON_ID_INDEX: &str = "PersonId";
pub const LICENSE_NUMBER_INDEX: &str = "LicenseNumber";

/// Indexes created after the tables are active, in creation order.
pub const INDEXES: &[IndexDef] = &[
    IndexDef {
        table: Table::Person,
        attribute: GOV_ID_INDEX,
    },
    IndexDef {
        table: Table::Vehicle,
        attribute: VIN_INDEX,
    },
    IndexDef {
        table: Table::VehicleRegistration,
        attribute: LICENSE_PLATE_NUMBER_INDEX,
    },
    IndexDef {
        table: Table::VehicleRegistration,
        attribute: VIN_INDEX,
    },
    IndexDef {
        table: Table::DriversLicense,
        attribute: PERSON_ID_INDEX,
    },
    IndexDef {
        table: Table::DriversLicense,
        attribute: LICENSE_NUMBER_INDEX,
    },
];

pub fn create_table_statement(table: Table) -> String {
    format!("CREATE TABLE {table}")
}

pub fn create_index_statement(index: &IndexDef) -> String {
    format!("CREATE INDEX on {} ({})", index.table, index.attribute)
}

/// `INSERT INTO <table> ?`, with the documents bound as a single list parameter.
pub fn insert_statement(table: Table) -> String {
    format!("INSERT INTO {table} ?")
}

/// Catalog query returning one row per user table, with its status and indexes.
/// Takes the table name as its only parameter.
pub const USER_TABLES_QUERY: &str = "SELECT * FROM information_schema.user_tables WHERE name = ?";

/// Expression string the ledger catalog reports for an index on `attribute`.
pub fn index_expr(attribute: &str) -> String {
    format!("[{attribute}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_names_are_unique_and_round_trip() {
        let names: HashSet<&str> = Table::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), 4);
        for table in Table::ALL {
            assert_eq!(Table::from_name(table.name()), Some(table));
        }
        assert_eq!(Table::from_name("Nope"), None);
    }

    #[test]
    fn six_distinct_indexes_on_known_tables() {
        let pairs: HashSet<(Table, &str)> = INDEXES.iter().map(|i| (i.table, i.attribute)).collect();
        assert_eq!(pairs.len(), 6);
        assert!(pairs.contains(&(Table::Person, "GovId")));
        assert!(pairs.contains(&(Table::Vehicle, "VIN")));
        assert!(pairs.contains(&(Table::VehicleRegistration, "LicensePlateNumber")));
        assert!(pairs.contains(&(Table::VehicleRegistration, "VIN")));
        assert!(pairs.contains(&(Table::DriversLicense, "PersonId")));
        assert!(pairs.contains(&(Table::DriversLicense, "LicenseNumber")));
    }

    #[test]
    fn statement_text() {
        assert_eq!(create_table_statement(Table::Person), "CREATE TABLE Person");
        assert_eq!(
            create_index_statement(&INDEXES[0]),
            "CREATE INDEX on Person (GovId)"
        );
        assert_eq!(
            insert_statement(Table::VehicleRegistration),
            "INSERT INTO VehicleRegistration ?"
        );
        assert_eq!(index_expr("VIN"), "[VIN]");
    }
}
