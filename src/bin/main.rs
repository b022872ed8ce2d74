// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use bankcore_rs::{AccountNumber, AccountType, Engine, UserId};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// Ledger batch runner - replay an operations CSV against the engine.
///
/// Reads account openings, deposits, withdrawals, and transfers from a CSV
/// file and outputs the resulting account states to stdout. Transfers run
/// through fraud evaluation; pass --flagged to list the transactions marked
/// for review instead.
#[derive(Parser, Debug)]
#[command(name = "bankcore-rs")]
#[command(about = "A banking ledger engine that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,account,to,amount
    /// Example: cargo run -- operations.csv > accounts.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output flagged transactions instead of account states
    #[arg(long)]
    flagged: bool,
}

/// All batch operations run under a single operator identity.
const OPERATOR: UserId = UserId(0);

fn main() {
    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_operations(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    let result = if args.flagged {
        write_flagged(&engine, std::io::stdout())
    } else {
        write_accounts(&engine, std::io::stdout())
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, account, to, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op: String,
    account: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
}

/// A parsed batch operation.
#[derive(Debug)]
enum Operation {
    /// Seed an account. The `to` column optionally carries the account kind.
    Open {
        number: AccountNumber,
        kind: AccountType,
        opening_balance: Decimal,
    },
    Deposit {
        number: String,
        amount: Decimal,
    },
    Withdrawal {
        number: String,
        amount: Decimal,
    },
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
    },
}

impl CsvRecord {
    /// Converts a CSV record into an operation.
    ///
    /// Returns `None` for unknown operation types or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        match self.op.to_lowercase().as_str() {
            "open" => {
                let kind = match self.to.as_deref() {
                    None | Some("") | Some("savings") => AccountType::Savings,
                    Some("current") => AccountType::Current,
                    Some("fixed_deposit") => AccountType::FixedDeposit,
                    Some(_) => return None,
                };
                Some(Operation::Open {
                    number: AccountNumber(self.account),
                    kind,
                    opening_balance: self.amount.unwrap_or(Decimal::ZERO),
                })
            }
            "deposit" => Some(Operation::Deposit {
                number: self.account,
                amount: self.amount?,
            }),
            "withdrawal" => Some(Operation::Withdrawal {
                number: self.account,
                amount: self.amount?,
            }),
            "transfer" => Some(Operation::Transfer {
                from: self.account,
                to: self.to.filter(|t| !t.is_empty())?,
                amount: self.amount?,
            }),
            _ => None,
        }
    }
}

/// Replays operations from a CSV reader against a fresh engine.
///
/// Streaming parse: arbitrarily large files are handled row by row.
/// Malformed rows and failed operations are skipped; a fraud flag is not a
/// failure, flagged transfers commit and show up in `--flagged` output.
///
/// # CSV Format
///
/// Expected columns: `type, account, to, amount`
/// - `type`: open, deposit, withdrawal, or transfer
/// - `account`: account number the operation acts on (source for transfers)
/// - `to`: destination account number (transfers) or account kind (open)
/// - `amount`: decimal amount (opening balance for open, optional)
///
/// # Example
///
/// ```csv
/// type,account,to,amount
/// open,1000000001,savings,5000.00
/// open,1000000002,current,0
/// transfer,1000000001,1000000002,250.00
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_operations<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(op) = record.into_operation() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid operation record");
                    continue;
                };

                let outcome = match op {
                    Operation::Open {
                        number,
                        kind,
                        opening_balance,
                    } => engine
                        .open_account_numbered(OPERATOR, number, kind, opening_balance)
                        .map(|_| ()),
                    Operation::Deposit { number, amount } => {
                        engine.deposit(OPERATOR, &number, amount).map(|_| ())
                    }
                    Operation::Withdrawal { number, amount } => {
                        engine.withdraw(OPERATOR, &number, amount).map(|_| ())
                    }
                    Operation::Transfer { from, to, amount } => {
                        engine.transfer(OPERATOR, &from, &to, amount, None).map(|_| ())
                    }
                };

                if let Err(_e) = outcome {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping operation: {}", _e);
                }
            }
            Err(_e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", _e);
                continue;
            }
        }
    }

    Ok(engine)
}

/// Writes account states to a CSV writer.
///
/// Columns: `number, kind, balance, transferred_today, active`, sorted by
/// account number, balances rounded to 2 decimal places.
pub fn write_accounts<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in engine.accounts() {
        wtr.serialize(account.as_ref())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes transactions flagged for review to a CSV writer, newest first.
pub fn write_flagged<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for transaction in engine.flagged_transactions() {
        wtr.serialize(transaction.as_ref())?;
    }
    wtr.flush()?;
    Ok(())
}
