pub mod expense;
pub mod invoice;
pub mod lease;
pub mod notification;
pub mod payment;
pub mod period;
pub mod property;
pub mod tenant;
pub mod unit;

pub use expense::{Expense, ExpenseCategory};
pub use invoice::{Invoice, InvoiceStatus};
pub use lease::{Lease, LeaseStatus};
pub use notification::{NotificationLog, NotificationStatus};
pub use payment::{Payment, PaymentMethod};
pub use property::Property;
pub use tenant::Tenant;
pub use unit::{Unit, UnitStatus};
