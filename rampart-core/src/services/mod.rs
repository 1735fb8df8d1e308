//! Service layer for protection logic
//!
//! Services are generic over the repository traits and hold no storage driver.

pub mod engine;
pub mod notifier;
pub mod quota;
pub mod sealed;
pub mod throttle;

pub use engine::{ProtectionContext, ProtectionEngine, Verdict};
pub use notifier::{AdminNotifier, LockoutNotice, LogNotifier, Mailer, NotificationService};
pub use quota::{QuotaCategory, RestrictionKind, RestrictionQuota};
pub use sealed::SealedConfig;
pub use throttle::{NotificationChannel, NotificationKey, NotificationThrottle};
