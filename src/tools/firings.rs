// src/tools/firings.rs
//! Conversions between discharge times and the binary firing matrix

use crate::error::{EmgErrorBuilder, EmgResult};
use ndarray::Array2;

/// Build the `emg_length x number_of_mus` binary firing matrix from discharge times
pub fn create_binary_firings(
    emg_length: usize,
    number_of_mus: usize,
    mupulses: &[Vec<usize>],
) -> EmgResult<Array2<u8>> {
    if mupulses.len() != number_of_mus {
        return Err(EmgErrorBuilder::new("tools::firings", "create_binary_firings").mismatch(
            "MUPULSES",
            "one pulse train per MU is required",
            number_of_mus,
            mupulses.len(),
        ));
    }

    let mut binary = Array2::<u8>::zeros((emg_length, number_of_mus));
    for (mu, pulses) in mupulses.iter().enumerate() {
        for &pulse in pulses {
            if pulse >= emg_length {
                return Err(EmgErrorBuilder::new("tools::firings", "create_binary_firings").mismatch(
                    "MUPULSES",
                    "discharge beyond the end of the recording",
                    format!("< {}", emg_length),
                    pulse,
                ));
            }
            binary[[pulse, mu]] = 1;
        }
    }
    Ok(binary)
}

/// Recover the discharge times of each MU from a binary firing matrix
pub fn mupulses_from_binary(binary: &Array2<u8>) -> Vec<Vec<usize>> {
    binary
        .columns()
        .into_iter()
        .map(|column| {
            column
                .iter()
                .enumerate()
                .filter(|(_, &v)| v != 0)
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}
