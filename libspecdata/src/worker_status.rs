#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarColor {
    #[default]
    CYAN,
    GREEN,
    RED,
}

/// Progress report sent by a worker over its channel after each file
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub files_done: usize,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, files_done: usize, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            files_done,
            worker_id,
            color,
        }
    }
}
