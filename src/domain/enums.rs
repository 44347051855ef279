/// Runtime status of the task timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerStatus {
    #[default]
    Stopped,
    Running,
}
