use crate::sample::{DriversLicense, SampleData, VehicleRegistration};
use crate::types::DocumentId;
use crate::SchemaError;

/// DriversLicense and VehicleRegistration records with their `PersonId`
/// references filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedRecords {
    pub drivers_licenses: Vec<DriversLicense>,
    pub vehicle_registrations: Vec<VehicleRegistration>,
}

/// Copy the license and registration collections out of `data` and point the
/// i-th license and the i-th registration's primary owner at `person_ids[i]`.
///
/// `person_ids` must be in Person insertion order. `data` is left untouched.
pub fn link_person_ids(
    data: &SampleData,
    person_ids: &[DocumentId],
) -> Result<LinkedRecords, SchemaError> {
    let persons = data.persons.len();
    if person_ids.len() < persons {
        return Err(SchemaError::MissingPersonIds {
            expected: persons,
            actual: person_ids.len(),
        });
    }
    if data.drivers_licenses.len() < persons || data.vehicle_registrations.len() < persons {
        return Err(SchemaError::Misaligned {
            persons,
            licenses: data.drivers_licenses.len(),
            registrations: data.vehicle_registrations.len(),
        });
    }

    let mut drivers_licenses = data.drivers_licenses.clone();
    let mut vehicle_registrations = data.vehicle_registrations.clone();
    for (i, id) in person_ids.iter().take(persons).enumerate() {
        drivers_licenses[i].person_id = id.to_string();
        vehicle_registrations[i].owners.primary_owner.person_id = id.to_string();
    }

    Ok(LinkedRecords {
        drivers_licenses,
        vehicle_registrations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<DocumentId> {
        (0..n).map(|i| DocumentId::new(format!("doc-{i}"))).collect()
    }

    #[test]
    fn every_license_and_owner_points_at_matching_person() {
        let data = SampleData::template();
        let person_ids = ids(data.persons.len());
        let linked = link_person_ids(data, &person_ids).unwrap();

        for (i, id) in person_ids.iter().enumerate() {
            assert_eq!(linked.drivers_licenses[i].person_id, id.as_str());
            assert_eq!(
                linked.vehicle_registrations[i].owners.primary_owner.person_id,
                id.as_str()
            );
        }
    }

    #[test]
    fn template_is_not_mutated() {
        let before = SampleData::template().clone();
        link_person_ids(SampleData::template(), &ids(5)).unwrap();
        link_person_ids(SampleData::template(), &ids(5)).unwrap();
        assert_eq!(*SampleData::template(), before);
    }

    #[test]
    fn too_few_ids_is_an_error() {
        let err = link_person_ids(SampleData::template(), &ids(3)).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingPersonIds {
                expected: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn other_fields_are_preserved() {
        let data = SampleData::template();
        let linked = link_person_ids(data, &ids(5)).unwrap();
        assert_eq!(
            linked.drivers_licenses[2].license_number,
            data.drivers_licenses[2].license_number
        );
        assert_eq!(
            linked.vehicle_registrations[4].license_plate_number,
            "TH393F"
        );
        assert!(linked.vehicle_registrations[0]
            .owners
            .secondary_owners
            .is_empty());
    }
}
