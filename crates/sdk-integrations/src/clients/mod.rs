pub mod ad_client;
pub mod push_client;
pub mod store_client;

pub use ad_client::AdClient;
pub use push_client::PushPermissionClient;
pub use store_client::StoreClient;
