mod bus;

pub use bus::EventBus;
