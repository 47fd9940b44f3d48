//! 数据访问层 (DAO) - 每类表一个专门的操作模块
//!
//! SQL 只出现在这里；DbActor 负责组合事务。

pub mod reference_dao;
pub mod sync_queue_dao;
pub mod workout_dao;

pub use reference_dao::ReferenceDao;
pub use sync_queue_dao::SyncQueueDao;
pub use workout_dao::WorkoutDao;
