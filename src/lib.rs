// Vendor Risk Engine - Core Library
// Exposes all modules for use in the CLI and tests

pub mod normalize;  // Name canonicalization + token similarity
pub mod records;    // Typed source records + field coercion
pub mod ingest;     // CSV loaders
pub mod matcher;    // Fuzzy entity matcher (token-set index)
pub mod resolve;    // Cross-dataset entity resolution
pub mod graph;      // Shared-address clusters + centrality
pub mod anomaly;    // Optional anomaly probability source
pub mod flags;      // Rule-based tender red flags
pub mod scoring;    // Blended tender risk scores
pub mod shell;      // Shell-company indicator scoring
pub mod vendor;     // Composite vendor risk profiles
pub mod alerts;     // Risk alerts + relationship edges
pub mod db;         // SQLite persistence
pub mod pipeline;   // End-to-end batch orchestration

// Re-export commonly used types
pub use normalize::{normalize_name, NormalizedName};
pub use records::{BondPurchase, BondRedemption, CompanyRecord, TenderRecord};
pub use ingest::{load_bond_purchases, load_bond_redemptions, load_companies, load_tenders};
pub use matcher::{
    EntityIndex, EntityMatcher, MatchCandidate,
    DEFAULT_MATCH_THRESHOLD, DEFAULT_TOP_K, STRICT_MATCH_THRESHOLD,
};
pub use resolve::{
    build_bond_flows, BondFlow, EntityRecord, EntityResolver, EntityType,
    MatchKind, MatchRecord, ResolutionOutcome,
};
pub use graph::{AddressGraph, AddressGraphBuilder};
pub use anomaly::{AnomalyScorer, NoAnomalyModel, StoredAnomalyScores};
pub use flags::{CategoryStatistics, FlagEvaluator, FlagWeights, TenderFlags};
pub use scoring::{
    blend_score, RiskTier, ScoreBreakdown, ScoredTender, ScoringSummary, TenderScorer,
};
pub use shell::{ShellProfile, ShellScorer, ShellSummary, ShellWeights};
pub use vendor::{
    DimensionWeights, PoliticalInfo, SubScores, VendorAssessment, VendorConnection,
    VendorProfile, VendorScorer,
};
pub use alerts::{AlertBundle, AlertEngine, RelationshipEdge, RiskAlert};
pub use pipeline::{PipelineConfig, RiskPipeline, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
