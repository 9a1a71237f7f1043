//! Schema definitions and sample dataset for the qldb-seed ledger provisioner.
//!
//! This crate defines what gets provisioned: the four DMV tables and their six
//! indexes (`Table`, `INDEXES`), the PartiQL statement text used to create and
//! fill them, the immutable sample dataset (`SampleData`), and the id-linking
//! transform that wires ledger-assigned Person ids into licenses and
//! registrations (`link_person_ids`).

pub mod link;
pub mod sample;
pub mod tables;
pub mod types;

pub use link::{link_person_ids, LinkedRecords};
pub use sample::{
    to_documents, DriversLicense, OwnerRef, Owners, Person, SampleData, Vehicle,
    VehicleRegistration,
};
pub use tables::{
    create_index_statement, create_table_statement, index_expr, insert_statement, IndexDef, Table,
    INDEXES, USER_TABLES_QUERY,
};
pub use types::{DocumentId, LedgerName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("expected {expected} person ids to link, got {actual}")]
    MissingPersonIds { expected: usize, actual: usize },
    #[error(
        "sample collections are not index-aligned: {persons} persons, {licenses} licenses, {registrations} registrations"
    )]
    Misaligned {
        persons: usize,
        licenses: usize,
        registrations: usize,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
