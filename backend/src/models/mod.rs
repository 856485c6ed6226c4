pub mod detection;
pub mod disease;

pub use detection::{Detection, NewDetection};
pub use disease::{Disease, DiseaseSummary, Medicine, MedicineKind, Severity, Treatment};
