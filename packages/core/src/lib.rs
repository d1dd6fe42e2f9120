//! `apigate` core: credentials, scopes, route descriptors, request context
//! and the error taxonomy shared by every stage of the API request pipeline.

pub mod context;
pub mod credential;
pub mod error;
pub mod route;
pub mod scope;
pub mod traits;
pub mod types;

pub use context::{ContextKey, RequestContext};
pub use credential::{AuthFailure, AuthMethod, Credential, DeployCredential, UserCredential};
pub use error::ApiError;
pub use route::{is_read_method, AuthRequirement, EntityBinding, FeatureCategory, RouteDescriptor};
pub use scope::{Scope, ScopeSet};
pub use traits::{ActivityStore, EntityStore, FeatureGate, TokenStore};
pub use types::{
    root_namespace_of, DeployTokenId, DeployTokenRecord, Group, Project, User, UserId, UserState,
    UserTokenRecord,
};
