//! Population configuration: allocation base values and batch sizing.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Starting cursors for identity allocation. Each created device advances
/// the relevant cursors by one.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BaseValuesConfig {
    /// First AP MAC address.
    #[serde(default = "default_ap_mac")]
    #[validate(custom(function = validation::validate_mac))]
    pub ap_mac: String,

    /// First AP IPv4 address.
    #[serde(default = "default_ap_ip")]
    #[validate(custom(function = validation::validate_ipv4))]
    pub ap_ip: String,

    /// First AP UDP port.
    #[serde(default = "default_ap_udp")]
    pub ap_udp: u16,

    /// First AP radio MAC address.
    #[serde(default = "default_radio_mac")]
    #[validate(custom(function = validation::validate_mac))]
    pub radio_mac: String,

    /// First client MAC address.
    #[serde(default = "default_client_mac")]
    #[validate(custom(function = validation::validate_mac))]
    pub client_mac: String,

    /// First client IPv4 address.
    #[serde(default = "default_client_ip")]
    #[validate(custom(function = validation::validate_ipv4))]
    pub client_ip: String,
}

fn default_ap_mac() -> String {
    "02:00:00:10:00:01".into()
}

fn default_ap_ip() -> String {
    "10.0.0.1".into()
}

fn default_ap_udp() -> u16 {
    10000
}

fn default_radio_mac() -> String {
    "02:00:00:20:00:01".into()
}

fn default_client_mac() -> String {
    "06:00:00:10:00:01".into()
}

fn default_client_ip() -> String {
    "10.0.128.1".into()
}

impl Default for BaseValuesConfig {
    fn default() -> Self {
        Self {
            ap_mac: default_ap_mac(),
            ap_ip: default_ap_ip(),
            ap_udp: default_ap_udp(),
            radio_mac: default_radio_mac(),
            client_mac: default_client_mac(),
            client_ip: default_client_ip(),
        }
    }
}

/// Population build parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PopulationConfig {
    #[validate(nested)]
    pub base_values: BaseValuesConfig,

    /// APs to create.
    #[serde(default = "default_num_aps")]
    pub num_aps: usize,

    /// Clients per AP.
    #[serde(default = "default_clients_per_ap")]
    pub clients_per_ap: usize,

    /// Concurrent joins across the whole population.
    #[serde(default = "default_max_concurrent")]
    #[validate(range(min = 1))]
    pub max_concurrent: usize,
}

fn default_num_aps() -> usize {
    1
}

fn default_clients_per_ap() -> usize {
    1
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            base_values: BaseValuesConfig::default(),
            num_aps: default_num_aps(),
            clients_per_ap: default_clients_per_ap(),
            max_concurrent: default_max_concurrent(),
        }
    }
}
