//! Core domain types for the attribution pipeline.

pub mod click;
pub mod conversion;
pub mod customer;
pub mod ids;
pub mod link;

// Re-export commonly used types at the module level
pub use click::{ClickEvent, Device, DeviceKind, Geo};
pub use conversion::{LeadEvent, SaleEvent, WebhookErrorRecord};
pub use customer::{ActivityType, Customer, CustomerActivity, NewCustomer};
pub use ids::{
    AnonymousId, ClickId, Currency, CustomerId, ExternalId, InvalidCurrency, InvoiceId, LinkId,
    WebhookId, WorkspaceId,
};
pub use link::{Link, WebhookConfig, WebhookTrigger, Workspace};
