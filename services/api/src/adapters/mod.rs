pub mod contract_llm;
pub mod db;
pub mod events;
pub mod storage;

pub use contract_llm::OpenAiContractAdapter;
pub use db::DbAdapter;
pub use events::BroadcastPublisher;
pub use storage::S3Storage;
