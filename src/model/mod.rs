//! Data contracts shared by the sync pipeline and the nearby query engine.

pub mod arrival;
pub mod repository;
pub mod stop;

pub use arrival::{ArrivalAnnouncement, LineGroup, NO_INFORMATION, ResponseAggregate};
pub use repository::{
    HttpVerb, LiveDataDescriptor, ParamKind, ParamSpec, RepositoryDescriptor, ResponseMapping,
    SyncStamp,
};
pub use stop::{Coordinate, GeoPoint, Stop};
