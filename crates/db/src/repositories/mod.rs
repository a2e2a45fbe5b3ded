pub mod widget_config_version_repo;

pub use widget_config_version_repo::WidgetConfigVersionRepo;
