mod task_manager;
mod worker;

pub use task_manager::TaskManager;
pub use worker::TaskWorker;
