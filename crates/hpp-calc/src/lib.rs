//! # HPP Calculation Engine
//!
//! 生產成本核算引擎：FIFO 扣料、配方解析、生產批次狀態機與成品入庫

pub mod batch_code;
pub mod composition;
pub mod costing;
pub mod fifo;
pub mod posting;
pub mod production;
pub mod requirements;
pub mod service;

// Re-export 主要類型
pub use batch_code::{BatchCodeGenerator, SequentialBatchCodeGenerator};
pub use composition::CompositionResolver;
pub use costing::{CostBreakdown, CostCalculator, CostSummary};
pub use fifo::{FifoConsumer, UsageResult};
pub use posting::{FinishedGoodsPoster, PostingResult};
pub use production::{CompleteProduction, ProductionEngine, ReceiveMaterial, StartProduction};
pub use requirements::{MaterialRequirement, RequirementCalculator, RequirementPreview};
pub use service::ProductionService;
