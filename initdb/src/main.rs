//! Applies the SQL migrations under `migrations/` to the database
//! named by `BHAJAN_DB_CONNECTION_STRING`.

use std::env;
use std::error::Error;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, error, info, initialize_logger, o};

const MIGRATIONS_DIR_VARIABLE: &str = "BHAJAN_MIGRATIONS_DIR";
const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger().new(o!("tool" => "initdb"));

    let connection_string = env::var("BHAJAN_DB_CONNECTION_STRING")
        .map_err(|_| "must define BHAJAN_DB_CONNECTION_STRING environment variable")?;
    let migrations_dir =
        env::var(MIGRATIONS_DIR_VARIABLE).unwrap_or_else(|_| DEFAULT_MIGRATIONS_DIR.to_owned());

    debug!(logger, "Connecting to database...");
    let mut client = Client::connect(&connection_string, NoTls)?;

    let mut movine = Movine::new(&mut client);
    movine.set_migration_dir(&migrations_dir);
    movine.set_strict(true);

    if movine.status().is_err() {
        debug!(logger, "Initializing movine...");
        movine.initialize()?;
    }

    debug!(logger, "Running migrations..."; "dir" => &migrations_dir);
    if let Err(e) = movine.up() {
        error!(logger, "Migrations failed"; "error" => %e);
        return Err(e.into());
    }

    info!(logger, "Completed initialization.");

    Ok(())
}
