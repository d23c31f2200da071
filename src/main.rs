use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use log::{error, info};
use people_scraper_lib::delay_manager::ThreadSleeper;
use people_scraper_lib::geo::columns_table;
use people_scraper_lib::{logger, Error, Result};
use people_scraper_lib::{
    Authenticator, Config, Credentials, Endpoints, GeoCatalog, GeoFilter, GeoUpdater, HttpClient,
    SearchEngine, SearchQuery, SessionStore, SessionValidator, SimpleSearch, StdinPrompter,
    Transport, Verbosity,
};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "people_scraper", about = "my.mail.ru people search wrapper")]
struct Cli {
    /// Increase verbosity level
    #[arg(long, global = true)]
    debug: bool,

    /// Decrease verbosity level
    #[arg(long = "quite", visible_alias = "quiet", global = true)]
    quite: bool,

    /// Seconds to wait between requests
    #[arg(long, global = true, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search for accounts and dump the result into a csv file
    Search {
        /// Name to search for
        search_name: String,
        #[arg(long)]
        country: Option<u64>,
        #[arg(long)]
        region: Option<u64>,
        #[arg(long)]
        city: Option<u64>,
        /// Search via the m.my.mail.ru listing instead of the ajax API
        #[arg(long)]
        simple: bool,
    },
    /// Show geo constants from the local snapshot
    Show {
        #[command(subcommand)]
        geo: ShowTarget,
    },
    /// Authenticate and save cookies to the session file
    Auth {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        /// Prompt for credentials
        #[arg(long = "i", visible_alias = "interactive")]
        interactive: bool,
    },
    /// Update geo info from the my.mail.ru database
    #[command(name = "update_geo")]
    UpdateGeo,
}

#[derive(Subcommand, Debug)]
enum ShowTarget {
    Countries {
        /// List every available country
        #[arg(long)]
        all: bool,
    },
    Regions {
        country_id: u64,
    },
    Cities {
        country_id: u64,
        region_id: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.debug, cli.quite);
    logger::init(verbosity.level());

    let command = match cli.command {
        Some(command) => command,
        None => {
            let _ = Cli::command().print_help();
            return ExitCode::SUCCESS;
        }
    };

    let config = Config {
        verbosity,
        ..Config::default()
    }
    .with_delay_secs(cli.timeout);

    match run(command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::AuthAttemptsExhausted { .. }) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &Config) -> Result<()> {
    let endpoints = Endpoints::default();
    let store = SessionStore::new(&config.session_file);
    let sleeper = ThreadSleeper;

    match command {
        Commands::Show { geo } => show(geo, config),
        Commands::Search {
            search_name,
            country,
            region,
            city,
            simple,
        } => {
            let transport = HttpClient::new(config)?;
            let engine = SearchEngine::new(&transport, config, &endpoints, &sleeper);
            ensure_session(&transport, &store, &endpoints, &engine)?;

            let query = SearchQuery::new(search_name).with_filter(GeoFilter {
                country,
                region,
                city,
            });
            let output = config.result_file(&query.name);

            if simple {
                let written = SimpleSearch::new(&transport, config, &endpoints, &sleeper)
                    .run(&query.name, &output)?;
                info!("{} profiles written to {:?}", written, output);
                return Ok(());
            }

            if !query.filter.is_empty() {
                if let Some(catalog) = GeoCatalog::load_or_disabled(&config.geo_file) {
                    info!("Filter: {}", catalog.describe_filter(&query.filter).join(", "));
                }
            }
            let summary = engine.search(&query, &output)?;
            info!(
                "{} of {} profiles written to {:?} ({} pages)",
                summary.written, summary.total, output, summary.pages
            );
            Ok(())
        }
        Commands::UpdateGeo => {
            let transport = HttpClient::new(config)?;
            let engine = SearchEngine::new(&transport, config, &endpoints, &sleeper);
            ensure_session(&transport, &store, &endpoints, &engine)?;
            GeoUpdater::new(&transport, config, &endpoints, &sleeper).refresh_to(&config.geo_file)?;
            Ok(())
        }
        Commands::Auth {
            username,
            password,
            domain,
            interactive,
        } => {
            let transport = HttpClient::new(config)?;
            let authenticator = Authenticator::new(&transport, &store, &endpoints);
            if interactive {
                authenticator.authenticate_interactive(&mut StdinPrompter)?;
                return Ok(());
            }
            match (username, password, domain) {
                (Some(username), Some(password), Some(domain)) => {
                    authenticator.authenticate(&Credentials {
                        username,
                        password,
                        domain,
                    })?;
                    info!("Auth success. Cookies saved to {:?}", store.path());
                    Ok(())
                }
                _ => Cli::command()
                    .error(
                        ErrorKind::MissingRequiredArgument,
                        "username, password and domain required",
                    )
                    .exit(),
            }
        }
    }
}

fn ensure_session<T: Transport>(
    transport: &T,
    store: &SessionStore,
    endpoints: &Endpoints,
    engine: &SearchEngine<'_, T>,
) -> Result<()> {
    let validator = SessionValidator::new(transport, store, endpoints, engine);
    let authenticator = Authenticator::new(transport, store, endpoints);
    validator.ensure(&authenticator, &mut StdinPrompter)?;
    Ok(())
}

fn show(target: ShowTarget, config: &Config) -> Result<()> {
    let catalog = match GeoCatalog::load_or_disabled(&config.geo_file) {
        Some(catalog) => catalog,
        None => return Ok(()),
    };

    match target {
        ShowTarget::Countries { all } => {
            let countries = catalog.countries(all);
            if all {
                let rows: Vec<(&str, &str)> = countries
                    .iter()
                    .map(|c| (c.country_id.as_str(), c.name.as_str()))
                    .collect();
                print!("{}", columns_table(&rows));
            } else {
                for country in countries {
                    println!("{} {}", country.country_id, country.name);
                }
            }
        }
        ShowTarget::Regions { country_id } => {
            let regions = catalog.regions_of(&country_id.to_string());
            if regions.is_empty() {
                error!("No regions found for this country_id");
            } else {
                let rows: Vec<(&str, &str)> = regions
                    .iter()
                    .map(|r| (r.region_id.as_str(), r.name.as_str()))
                    .collect();
                print!("{}", columns_table(&rows));
            }
        }
        ShowTarget::Cities {
            country_id,
            region_id,
        } => {
            let country_id = country_id.to_string();
            let region_id = region_id.to_string();
            if catalog.regions_of(&country_id).is_empty() {
                error!("No regions found for this country_id");
            } else {
                let cities = catalog.cities_of(&country_id, &region_id);
                if cities.is_empty() {
                    error!("No cities found for this country_id and region_id");
                } else {
                    let rows: Vec<(&str, &str)> = cities
                        .iter()
                        .map(|c| (c.city_id.as_str(), c.name.as_str()))
                        .collect();
                    print!("{}", columns_table(&rows));
                }
            }
        }
    }
    Ok(())
}
