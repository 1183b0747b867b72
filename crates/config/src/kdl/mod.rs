//! KDL configuration parsing.
//!
//! This module contains all functions for parsing KDL configuration files
//! into zonecert configuration structures. It is organized into submodules:
//!
//! - `helpers`: Common parsing utility functions
//! - `acme`: Process-wide ACME defaults
//! - `providers`: Plugin and DNS provider definitions

mod acme;
mod helpers;
mod providers;

pub use helpers::{
    get_arg_pair, get_first_arg_string, get_int_entry, get_string_args, get_string_entry,
    get_u64_entry, offset_to_line_col,
};

pub use acme::parse_acme_config;
pub use providers::{parse_dns_provider, parse_plugin};

use anyhow::Result;

use crate::Config;

/// Convert a parsed KDL document to Config
pub fn parse_kdl_document(doc: kdl::KdlDocument) -> Result<Config> {
    let mut acme = None;
    let mut plugins = Vec::new();
    let mut dns_providers = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => {
                if acme.is_some() {
                    return Err(anyhow::anyhow!(
                        "Duplicate 'acme' configuration block; merge the settings into one block"
                    ));
                }
                acme = Some(parse_acme_config(node)?);
            }
            "plugin" => {
                plugins.push(parse_plugin(node)?);
            }
            "dns-provider" => {
                dns_providers.push(parse_dns_provider(node)?);
            }
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown top-level configuration block: '{}'\n\
                     Valid blocks are: acme, plugin, dns-provider",
                    other
                ));
            }
        }
    }

    Ok(Config {
        acme: acme.unwrap_or_default(),
        plugins,
        dns_providers,
    })
}
