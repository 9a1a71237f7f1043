//! The fixed DMV sample dataset loaded into a freshly provisioned ledger.
//!
//! [`SampleData::template`] is built once and never mutated. Callers that need
//! to inject ledger-generated ids work on clones (see [`crate::link`]).

use crate::SchemaError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "DOB")]
    pub dob: NaiveDate,
    pub gov_id: String,
    pub gov_id_type: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vehicle {
    #[serde(rename = "VIN")]
    pub vin: String,
    #[serde(rename = "Type")]
    pub vehicle_type: String,
    pub year: u16,
    pub make: String,
    pub model: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriversLicense {
    pub person_id: String,
    pub license_number: String,
    pub license_type: String,
    pub valid_from_date: NaiveDate,
    pub valid_to_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OwnerRef {
    pub person_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Owners {
    pub primary_owner: OwnerRef,
    pub secondary_owners: Vec<OwnerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleRegistration {
    #[serde(rename = "VIN")]
    pub vin: String,
    pub license_plate_number: String,
    pub state: String,
    pub city: String,
    /// Decimal amount kept as text so no precision is lost on the way to the ledger.
    pub pending_penalty_ticket_amount: String,
    pub valid_from_date: NaiveDate,
    pub valid_to_date: NaiveDate,
    pub owners: Owners,
}

/// The four index-aligned sample collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleData {
    pub persons: Vec<Person>,
    pub vehicles: Vec<Vehicle>,
    pub drivers_licenses: Vec<DriversLicense>,
    pub vehicle_registrations: Vec<VehicleRegistration>,
}

static TEMPLATE: LazyLock<SampleData> = LazyLock::new(build_template);

impl SampleData {
    /// Shared immutable template. Clone before mutating.
    pub fn template() -> &'static SampleData {
        &TEMPLATE
    }
}

/// Serialize a record collection into the single list parameter bound to
/// an `INSERT INTO <table> ?` statement.
pub fn to_documents<T: Serialize>(records: &[T]) -> Result<serde_json::Value, SchemaError> {
    Ok(serde_json::to_value(records)?)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    // Only called with literal calendar dates below.
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn person(first: &str, last: &str, dob: NaiveDate, gov_id: &str, kind: &str, addr: &str) -> Person {
    Person {
        first_name: first.to_owned(),
        last_name: last.to_owned(),
        dob,
        gov_id: gov_id.to_owned(),
        gov_id_type: kind.to_owned(),
        address: addr.to_owned(),
    }
}

fn vehicle(vin: &str, kind: &str, year: u16, make: &str, model: &str, color: &str) -> Vehicle {
    Vehicle {
        vin: vin.to_owned(),
        vehicle_type: kind.to_owned(),
        year,
        make: make.to_owned(),
        model: model.to_owned(),
        color: color.to_owned(),
    }
}

fn license(number: &str, kind: &str, from: NaiveDate, to: NaiveDate) -> DriversLicense {
    DriversLicense {
        person_id: String::new(),
        license_number: number.to_owned(),
        license_type: kind.to_owned(),
        valid_from_date: from,
        valid_to_date: to,
    }
}

fn registration(
    vin: &str,
    plate: &str,
    city: &str,
    amount: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> VehicleRegistration {
    VehicleRegistration {
        vin: vin.to_owned(),
        license_plate_number: plate.to_owned(),
        state: "WA".to_owned(),
        city: city.to_owned(),
        pending_penalty_ticket_amount: amount.to_owned(),
        valid_from_date: from,
        valid_to_date: to,
        owners: Owners::default(),
    }
}

fn build_template() -> SampleData {
    SampleData {
        persons: vec![
            person(
                "Raul",
                "Lewis",
                date(1963, 8, 19),
                "LEWISR261LL",
                "Driver License",
                "1719 University Street, Seattle, WA, 98109",
            ),
            person(
                "Brent",
                "Logan",
                date(1967, 7, 3),
                "LOGANB486CG",
                "Driver License",
                "43 Stockert Hollow Road, Everett, WA, 98203",
            ),
            person(
                "Alexis",
                "Pena",
                date(1974, 2, 10),
                "744 849 301",
                "SSN",
                "4058 Melrose Street, Spokane Valley, WA, 99206",
            ),
            person(
                "Melvin",
                "Parker",
                date(1976, 5, 22),
                "P626-168-229-765",
                "Passport",
                "4362 Ryder Avenue, Seattle, WA, 98101",
            ),
            person(
                "Salvatore",
                "Spencer",
                date(1997, 11, 15),
                "S152-780-97-415-0",
                "Passport",
                "4450 Honeysuckle Lane, Seattle, WA, 98101",
            ),
        ],
        vehicles: vec![
            vehicle("1N4AL11D75C109151", "Sedan", 2011, "Audi", "A5", "Silver"),
            vehicle("KM8SRDHF6EU074761", "Sedan", 2015, "Tesla", "Model S", "Blue"),
            vehicle("3HGGK5G53FM761765", "Motorcycle", 2011, "Ducati", "Monster 1200", "Yellow"),
            vehicle("1HVBBAANXWH544237", "Semi", 2009, "Ford", "F 150", "Black"),
            vehicle("1C4RJFAG0FC625797", "Sedan", 2019, "Mercedes", "CLK 350", "White"),
        ],
        drivers_licenses: vec![
            license("LEWISR261LL", "Learner", date(2016, 12, 20), date(2020, 11, 15)),
            license("LOGANB486CG", "Probationary", date(2016, 4, 6), date(2020, 11, 15)),
            license("744 849 301", "Full", date(2017, 12, 6), date(2022, 10, 15)),
            license("P626-168-229-765", "Learner", date(2017, 8, 16), date(2021, 11, 15)),
            license("S152-780-97-415-0", "Probationary", date(2015, 8, 15), date(2021, 8, 21)),
        ],
        vehicle_registrations: vec![
            registration(
                "1N4AL11D75C109151",
                "LEWISR261LL",
                "Seattle",
                "90.25",
                date(2017, 8, 21),
                date(2020, 5, 11),
            ),
            registration(
                "KM8SRDHF6EU074761",
                "CA762X",
                "Kent",
                "130.75",
                date(2017, 9, 14),
                date(2020, 6, 25),
            ),
            registration(
                "3HGGK5G53FM761765",
                "CD820Z",
                "Everett",
                "442.30",
                date(2011, 3, 17),
                date(2021, 3, 24),
            ),
            registration(
                "1HVBBAANXWH544237",
                "LS477D",
                "Tacoma",
                "42.20",
                date(2011, 10, 26),
                date(2023, 9, 25),
            ),
            registration(
                "1C4RJFAG0FC625797",
                "TH393F",
                "Olympia",
                "30.45",
                date(2013, 9, 2),
                date(2024, 3, 19),
            ),
        ],
    }
}
