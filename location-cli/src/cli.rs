use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::Select;
use location_core::{Config, Level, LocationProvider, Picker, provider_from_config};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "location", version, about = "Cascading location picker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively pick a country, then a state, then a city.
    Pick,

    /// Print the available options for one level, one name per line.
    List {
        #[command(subcommand)]
        level: ListLevel,
    },

    /// Configure the location service endpoint.
    Configure {
        /// Base URL of the location service.
        #[arg(long)]
        url: Option<String>,

        /// Per-request timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Forget stored settings and fall back to the hosted service.
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ListLevel {
    /// All known countries.
    Countries,

    /// States of one country.
    States { country: String },

    /// Cities of one state.
    Cities { country: String, state: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Pick => pick().await,
            Command::List { level } => list(level).await,
            Command::Configure { url, timeout, reset } => configure(url, timeout, reset),
        }
    }
}

async fn pick() -> Result<()> {
    let config = Config::load()?;
    let provider = provider_from_config(&config)?;
    let mut picker = Picker::new(provider);

    let countries = load_options(&mut picker, Level::Country).await?;
    let country = Select::new("Select country:", countries).prompt()?;
    picker.select_country(&country);

    let states = load_options(&mut picker, Level::State).await?;
    let state = Select::new("Select state:", states).prompt()?;
    picker.select_state(&state);

    let cities = load_options(&mut picker, Level::City).await?;
    let city = Select::new("Select city:", cities).prompt()?;
    picker.select_city(&city);

    if let Some(summary) = picker.selector().summary() {
        println!("{summary}");
    }

    Ok(())
}

/// Wait for the outstanding fetch to settle, then hand back the options for
/// `level`, turning a stored failure into a CLI error.
async fn load_options(picker: &mut Picker, level: Level) -> Result<Vec<String>> {
    picker.settle().await;

    if let Some(message) = picker.selector().status(level).error() {
        bail!("{message}");
    }

    let options = picker.selector().options(level).to_vec();
    if options.is_empty() {
        bail!("The service returned no {level} options to choose from");
    }

    Ok(options)
}

async fn list(level: ListLevel) -> Result<()> {
    let config = Config::load()?;
    let provider = provider_from_config(&config)?;

    let names = match &level {
        ListLevel::Countries => provider.countries().await?,
        ListLevel::States { country } => provider.states(country).await?,
        ListLevel::Cities { country, state } => provider.cities(country, state).await?,
    };

    for name in names {
        println!("{name}");
    }

    Ok(())
}

fn configure(url: Option<String>, timeout: Option<u64>, reset: bool) -> Result<()> {
    let mut config = Config::load()?;

    if reset {
        config = Config::default();
    }
    if let Some(url) = url {
        config.set_service_url(Some(url));
    }
    if let Some(secs) = timeout {
        config.set_request_timeout_secs(Some(secs));
    }

    // Catch unusable URLs before they are persisted.
    provider_from_config(&config).context("Refusing to save an unusable service URL")?;

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    println!("Service URL: {}", config.service_url());

    Ok(())
}
