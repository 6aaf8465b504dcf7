//! stockledger CLI
//!
//! Commands:
//! - `stockledger migrate` - apply database migrations
//! - `stockledger account create|instrument create` - seed a fresh database
//! - `stockledger instruments|instrument show` - list and look up instruments
//! - `stockledger buy|sell` - execute a market trade
//! - `stockledger cancel|suspend|resume|set-price` - administrative actions
//! - `stockledger portfolio|orders` - account views
//! - `stockledger demo` - scripted walk-through against an in-memory store

pub mod demo;
pub mod ledger;
pub mod output;
pub mod setup;

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

/// Simulated stock trading ledger
#[derive(Parser, Debug)]
#[command(name = "stockledger")]
#[command(author, version, about = "Simulated stock trading ledger")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON instead of human-readable tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration directory (default.toml plus environment overlays)
    #[arg(short, long, global = true, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply database migrations
    Migrate,

    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Manage instruments
    Instrument {
        #[command(subcommand)]
        action: InstrumentCommands,
    },

    /// List all instruments
    Instruments,

    /// Buy shares at the current price
    Buy {
        #[arg(long)]
        account: i64,
        #[arg(long)]
        instrument: i64,
        #[arg(long)]
        quantity: i64,
    },

    /// Sell shares at the current price
    Sell {
        #[arg(long)]
        account: i64,
        #[arg(long)]
        instrument: i64,
        #[arg(long)]
        quantity: i64,
    },

    /// Cancel a completed order and refund its cash (admin)
    Cancel {
        #[arg(long)]
        order: i64,
        #[arg(long)]
        admin: i64,
        #[arg(long)]
        reason: String,
    },

    /// Suspend trading on an instrument (admin)
    Suspend {
        #[arg(long)]
        instrument: i64,
        #[arg(long)]
        admin: i64,
        #[arg(long)]
        reason: String,
    },

    /// Resume trading on an instrument (admin)
    Resume {
        #[arg(long)]
        instrument: i64,
        #[arg(long)]
        admin: i64,
    },

    /// Override an instrument's price (admin)
    SetPrice {
        #[arg(long)]
        instrument: i64,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        admin: i64,
        #[arg(long, default_value = "manual adjustment")]
        reason: String,
    },

    /// Show cash, positions and unrealized PnL
    Portfolio {
        #[arg(long)]
        account: i64,
    },

    /// Show an account's most recent orders
    Orders {
        #[arg(long)]
        account: i64,
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Run a scripted walk-through against an in-memory store
    Demo,
}

#[derive(Subcommand, Debug)]
pub enum AccountCommands {
    /// Open an account; use `--role admin` to bootstrap an administrator
    Create {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "0")]
        balance: Decimal,
        #[arg(long, value_enum, default_value_t = RoleArg::User)]
        role: RoleArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum InstrumentCommands {
    /// List a new instrument
    Create {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
    },

    /// Show one instrument by symbol
    Show { symbol: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    User,
    Admin,
}

impl From<RoleArg> for crate::domain::Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => crate::domain::Role::User,
            RoleArg::Admin => crate::domain::Role::Admin,
        }
    }
}

impl Commands {
    /// Commands that write seed rows straight to the database
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Commands::Account { .. }
                | Commands::Instrument {
                    action: InstrumentCommands::Create { .. }
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buy() {
        let cli = Cli::parse_from([
            "stockledger",
            "buy",
            "--account",
            "1",
            "--instrument",
            "2",
            "--quantity",
            "10",
        ]);
        assert!(matches!(
            cli.command,
            Commands::Buy {
                account: 1,
                instrument: 2,
                quantity: 10
            }
        ));
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_set_price_with_global_json() {
        let cli = Cli::parse_from([
            "stockledger",
            "set-price",
            "--instrument",
            "3",
            "--price",
            "101.25",
            "--admin",
            "1",
            "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::SetPrice { price, reason, .. } => {
                assert_eq!(price, rust_decimal_macros::dec!(101.25));
                assert_eq!(reason, "manual adjustment");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_admin_bootstrap() {
        let cli = Cli::parse_from([
            "stockledger",
            "account",
            "create",
            "--username",
            "root",
            "--role",
            "admin",
        ]);
        assert!(cli.command.is_setup());
        match cli.command {
            Commands::Account {
                action:
                    AccountCommands::Create {
                        username,
                        balance,
                        role,
                    },
            } => {
                assert_eq!(username, "root");
                assert_eq!(balance, Decimal::ZERO);
                assert_eq!(role, RoleArg::Admin);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_instrument_create() {
        let cli = Cli::parse_from([
            "stockledger",
            "instrument",
            "create",
            "--symbol",
            "acme",
            "--name",
            "Acme Corp",
            "--price",
            "100.00",
        ]);
        assert!(cli.command.is_setup());
        match cli.command {
            Commands::Instrument {
                action: InstrumentCommands::Create { symbol, name, price },
            } => {
                assert_eq!(symbol, "acme");
                assert_eq!(name, "Acme Corp");
                assert_eq!(price, rust_decimal_macros::dec!(100.00));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_instrument_lookups() {
        let cli = Cli::parse_from(["stockledger", "instrument", "show", "ACME"]);
        assert!(!cli.command.is_setup());
        assert!(matches!(
            cli.command,
            Commands::Instrument {
                action: InstrumentCommands::Show { ref symbol }
            } if symbol == "ACME"
        ));

        let cli = Cli::parse_from(["stockledger", "instruments", "--json"]);
        assert!(matches!(cli.command, Commands::Instruments));
        assert!(cli.json);
    }
}
