use matrix_lab::{BackendSupervisor, HealthPoller};

pub struct AppState {
    pub supervisor: BackendSupervisor,
    pub health_poller: HealthPoller,
}

impl AppState {
    pub fn new(supervisor: BackendSupervisor, health_poller: HealthPoller) -> Self {
        Self {
            supervisor,
            health_poller,
        }
    }
}
