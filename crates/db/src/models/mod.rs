pub mod widget_config_version;
