pub mod batch;
pub mod cascade;
pub mod color;
pub mod contours;
pub mod dispatch;
pub mod face_detection;
pub mod filters;
pub mod geometry;
pub mod params;
pub mod registry;

pub use dispatch::{apply, Processed};
pub use params::{coerce_float, coerce_int, parse_key_values, Operation, OperationKind, RawParams};
pub use registry::{list_operations, OperationDescriptor, ParamDescriptor};
