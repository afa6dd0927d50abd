//! C4: lease sets (type 1 and LS2 variants), their builder-side
//! counterparts, the outstanding-lookup state machine, and the destination
//! objects that own them (spec §3, §4.3).

pub mod destination;
pub mod lease;
pub mod lease_set;
pub mod lease_set2;
pub mod local;
pub mod requests;

pub use destination::{ClientDestination, LeaseSetDestination};
pub use lease::Lease;
pub use lease_set::LeaseSet;
pub use lease_set2::{EncryptedLeaseSet2, LeaseSet2Header, LeaseSet2Property, LeaseSet2Standard, OfflineSignatureBlock};
pub use local::{LocalEncryptedLeaseSet2, LocalLeaseSet, LocalLeaseSet2};
pub use requests::LeaseSetRequests;
