//! mbaas CLI
//!
//! Command-line access to records in the document store.
//!
//! # Commands
//!
//! - `fetch` - Print one record
//! - `query` - Print the records of a class matching simple constraints
//! - `count` - Count the records of a class
//! - `delete` - Delete one record
//! - `login` / `logout` / `whoami` - Manage the stored session

use clap::{Parser, Subcommand};
use mbaas_client::{ClientError, Config, FileStorage, HttpTransport, Result};
use mbaas_engine::{CurrentUser, QueryBuilder, Record, SessionContext, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line client for the mbaas document store.
#[derive(Parser)]
#[command(name = "mbaas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one record
    Fetch {
        class_name: String,
        object_id: String,
    },

    /// Print the records of a class
    Query {
        class_name: String,

        /// Equality constraint as key=value; the value is parsed as JSON
        /// when possible
        #[arg(short, long = "eq")]
        equal: Vec<String>,

        /// Sort key; prefix with '-' for descending
        #[arg(short, long)]
        order: Option<String>,

        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<u32>,

        /// Number of records to skip
        #[arg(short, long, default_value = "0")]
        skip: u32,

        /// Pointer fields to embed
        #[arg(short, long)]
        include: Vec<String>,
    },

    /// Count the records of a class
    Count {
        class_name: String,

        /// Equality constraint as key=value
        #[arg(short, long = "eq")]
        equal: Vec<String>,
    },

    /// Delete one record
    Delete {
        class_name: String,
        object_id: String,
    },

    /// Sign in and store the session
    Login { user_name: String, password: String },

    /// Forget the stored session
    Logout,

    /// Print the stored user
    Whoami,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "mbaas_client=debug,mbaas_engine=debug"
    } else {
        "mbaas_client=info,mbaas_engine=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let transport = HttpTransport::new(&config)?;

    tracing::debug!("Using service at {}", config.api_url);

    match cli.command {
        Commands::Fetch {
            class_name,
            object_id,
        } => {
            let context = stored_context(&config)?;
            let mut record = Record::pointer(class_name, object_id);
            record.fetch(&transport, &context)?;
            print_json(&record.encode()?)?;
        }
        Commands::Query {
            class_name,
            equal,
            order,
            limit,
            skip,
            include,
        } => {
            let context = stored_context(&config)?;
            let mut query = build_query(class_name, &equal)?;
            if let Some(order) = order {
                match order.strip_prefix('-') {
                    Some(key) => query.descending(key),
                    None => query.ascending(&order),
                };
            }
            if let Some(limit) = limit {
                query.limit(limit);
            }
            query.skip(skip);
            for key in &include {
                query.include(key);
            }

            let records = query.find(&transport, &context)?;
            let documents = records
                .iter()
                .map(Record::encode)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            print_json(&serde_json::Value::Array(documents))?;
        }
        Commands::Count { class_name, equal } => {
            let context = stored_context(&config)?;
            let query = build_query(class_name, &equal)?;
            println!("{}", query.count_results(&transport, &context)?);
        }
        Commands::Delete {
            class_name,
            object_id,
        } => {
            let context = stored_context(&config)?;
            let record = Record::pointer(class_name, object_id);
            record.destroy(&transport, &context)?;
            tracing::info!("Deleted {}", record.object_path()?);
        }
        Commands::Login {
            user_name,
            password,
        } => {
            let mut current = session(&config)?;
            let (user, _) = current.log_in(&transport, &user_name, &password)?;
            print_json(&user.encode()?)?;
        }
        Commands::Logout => {
            session(&config)?.log_out()?;
        }
        Commands::Whoami => match session(&config)?.current()? {
            Some((user, _)) => print_json(&user.encode()?)?,
            None => println!("Not logged in"),
        },
    }

    Ok(())
}

fn session(config: &Config) -> Result<CurrentUser<FileStorage>> {
    let path = config.session_file.clone().ok_or_else(|| {
        ClientError::InvalidArgument("MBAAS_SESSION_FILE must be set to manage sessions".into())
    })?;
    Ok(CurrentUser::new(FileStorage::new(path)))
}

/// The stored session, or an anonymous one.
fn stored_context(config: &Config) -> Result<SessionContext> {
    if config.session_file.is_none() {
        return Ok(SessionContext::anonymous());
    }
    Ok(session(config)?
        .current()?
        .map(|(_, context)| context)
        .unwrap_or_default())
}

fn build_query(class_name: String, constraints: &[String]) -> Result<QueryBuilder> {
    let mut query = QueryBuilder::new(class_name);
    for constraint in constraints {
        let (key, raw) = constraint.split_once('=').ok_or_else(|| {
            ClientError::InvalidArgument(format!("expected key=value, got '{}'", constraint))
        })?;
        query.equal_to(key, parse_value(raw)?)?;
    }
    Ok(query)
}

fn parse_value(raw: &str) -> Result<Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Ok(mbaas_engine::codec::decode(&json)?),
        Err(_) => Ok(Value::from(raw)),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
