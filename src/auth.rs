use anyhow::{bail, Result};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

const PASSPHRASE_ENV: &str = "KEYHOLD_PASSPHRASE";

/// Read the passphrase for an existing key.
///
/// Sources, in order: the `KEYHOLD_PASSPHRASE` environment variable, a line
/// piped on stdin, an interactive prompt.
pub fn read_passphrase() -> Result<Zeroizing<String>> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        if !passphrase.is_empty() {
            return Ok(Zeroizing::new(passphrase));
        }
    }

    if !io::stdin().is_terminal() {
        let mut line = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut line)?;
        trim_newline(&mut line);
        if !line.is_empty() {
            return Ok(line);
        }
    } else {
        let passphrase = rpassword::prompt_password("Passphrase: ")?;
        if !passphrase.is_empty() {
            return Ok(Zeroizing::new(passphrase));
        }
    }

    bail!("no passphrase provided")
}

/// Read and confirm the passphrase for a new key.
///
/// Non-interactive callers supply it once via `KEYHOLD_PASSPHRASE` or as two
/// matching lines on stdin; on a terminal the prompt asks twice.
pub fn read_new_passphrase() -> Result<Zeroizing<String>> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        if !passphrase.is_empty() {
            return Ok(Zeroizing::new(passphrase));
        }
    }

    let (first, second) = if !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut first = Zeroizing::new(String::new());
        let mut second = Zeroizing::new(String::new());
        handle.read_line(&mut first)?;
        handle.read_line(&mut second)?;
        trim_newline(&mut first);
        trim_newline(&mut second);
        (first, second)
    } else {
        (
            Zeroizing::new(rpassword::prompt_password("New passphrase: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm passphrase: ")?),
        )
    };

    if first.is_empty() {
        bail!("passphrase cannot be empty");
    }
    if first != second {
        bail!("passphrases do not match");
    }

    Ok(first)
}

fn trim_newline(s: &mut Zeroizing<String>) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
