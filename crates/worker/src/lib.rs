//! Background loops for the retention engine: the periodic sweep
//! (automatic state advancement + alert generation) and the alert
//! delivery/repeat pass.

pub mod delivery_loop;
pub mod sweep_loop;
