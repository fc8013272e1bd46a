pub mod client;
pub mod kube;
pub mod load;
pub mod resource;
pub mod stack;

pub use self::client::Client;
pub use self::kube::KubeApi;
pub use self::resource::{Resource, ResourceId, ResourceKind};
pub use self::stack::{Stack, CHECKSUM_ANNOTATION, STACK_LABEL};
