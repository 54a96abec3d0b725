//! Well-known health event type names.
//!
//! Published on the event bus by the operation that mutates a record and
//! matched by the alert router.

/// A prenatal checkup was saved. Payload: `patient_name`, `systolic`,
/// `diastolic`, optional `checkup_id`.
pub const PRENATAL_CHECKUP_RECORDED: &str = "prenatal_checkup.recorded";

/// A child was registered. Payload: `child_name`, optional `child_id`.
pub const CHILD_REGISTERED: &str = "child.registered";

/// A vaccine dose was given. Payload: `child_name`, `vaccine_name`, optional
/// `dose_number`.
pub const IMMUNIZATION_RECORDED: &str = "immunization.recorded";

/// Vaccine stock fell below the reorder level. Payload: `vaccine_name`,
/// `quantity`.
pub const VACCINE_STOCK_LOW: &str = "vaccine.stock_low";
