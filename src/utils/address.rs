use std::str::FromStr;

use bitcoin::{Address, Network, ScriptBuf};

use crate::{InscribeError, InscribeResult};

/// Resolve an address string to its scriptPubKey on the given network.
pub fn addr_to_pk_script(addr: &str, network: Network) -> InscribeResult<ScriptBuf> {
    let address = Address::from_str(addr)
        .map_err(|err| InscribeError::MalformedAddress(err.to_string()))?
        .require_network(network)
        .map_err(|err| InscribeError::MalformedAddress(err.to_string()))?;

    Ok(address.script_pubkey())
}
