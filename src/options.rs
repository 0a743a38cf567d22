//! Constructor argument validation.
//!
//! An instance is created from `(ifname [, opts])`. The option list is a flat
//! sequence of names, some of which are followed by a value:
//!
//! ```text
//! ["hostname", "myhost", "auto_clientid", "vendorclassid", "acme"]
//! ```

use crate::{error::ArgError, value::Value};

const OPT_HOSTNAME: &str = "hostname";
const OPT_VENDOR_CLASS_ID: &str = "vendorclassid";
const OPT_AUTO_CLIENT_ID: &str = "auto_clientid";

/// Options handed to the lease engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    /// Sent to the server as option 12.
    pub hostname: Option<String>,
    /// Sent to the server as option 60.
    pub vendor_class_id: Option<String>,
    /// Send a client identifier (option 61) derived from the interface MAC.
    pub auto_client_id: bool,
}

/// Validates the raw constructor arguments.
///
/// Returns the interface name and the parsed options. Nothing is started here;
/// a failure leaves no trace besides the returned error.
pub fn parse_args(args: &[Value]) -> Result<(String, DhcpOptions), ArgError> {
    let (ifname_arg, opts_arg) = match args {
        [ifname] => (ifname, None),
        [ifname, opts] => (ifname, Some(opts)),
        _ => return Err(ArgError::Arity(args.len())),
    };

    let ifname = ifname_arg
        .as_str_no_nulls()
        .ok_or(ArgError::Type("interface name must be a string without nul bytes"))?;

    let options = match opts_arg {
        None => DhcpOptions::default(),
        Some(opts) => {
            let list = opts
                .as_list()
                .ok_or(ArgError::Type("options must be a list"))?;
            parse_option_list(list)?
        }
    };

    Ok((ifname.to_string(), options))
}

fn parse_option_list(list: &[Value]) -> Result<DhcpOptions, ArgError> {
    let mut options = DhcpOptions::default();
    let mut entries = list.iter();

    while let Some(entry) = entries.next() {
        let name = entry
            .as_str_no_nulls()
            .ok_or(ArgError::Type("wrong option name type"))?;

        match name {
            OPT_HOSTNAME | OPT_VENDOR_CLASS_ID => {
                let value = entries
                    .next()
                    .ok_or_else(|| ArgError::MissingValue(name.to_string()))?
                    .as_str_no_nulls()
                    .ok_or(ArgError::Type("wrong option value type"))?
                    .to_string();

                if name == OPT_HOSTNAME {
                    options.hostname = Some(value);
                } else {
                    options.vendor_class_id = Some(value);
                }
            }
            OPT_AUTO_CLIENT_ID => options.auto_client_id = true,
            other => return Err(ArgError::UnknownOption(other.to_string())),
        }
    }

    Ok(options)
}
