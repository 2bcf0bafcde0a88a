pub mod client;
pub mod evidence;
pub mod expander;
pub mod fusion;
pub mod models;
pub mod prompts;
pub mod query_gen;
pub mod router;
pub mod schema;
pub mod seeder;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use evidence::CitationWhitelist;
pub use expander::{ExpansionFilters, GraphExpander, RelationshipFilter};
pub use fusion::EvidenceFuser;
pub use models::ModelGateway;
pub use query_gen::QueryGenerator;
pub use router::{PipelineSettings, RouteOverrides, Router};
pub use schema::SchemaCache;
pub use seeder::SemanticSeeder;
