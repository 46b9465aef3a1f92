pub mod driver;
pub mod export;
pub mod report;

pub use driver::{PipelineConfig, PipelineDriver, PipelineOutput, Stage};
pub use export::{render_anomalies, render_state, table_digest, ExportFormat, ANOMALY_COLUMNS};
pub use report::RunReport;
