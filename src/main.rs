use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vitesse::{
    Candidate, CandidateError, CandidateFilter, CandidateForm, CandidateStore, CandidateUseCases,
    Config, CurrencyClient, RateProvider,
};

#[derive(Parser)]
#[command(name = "vitesse")]
#[command(about = "Track job candidates, favorites and expected salaries")]
struct Cli {
    /// Path to the SQLite database (overrides VITESSE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database if needed and show where it lives
    Init,

    /// Add a candidate
    Add {
        #[command(flatten)]
        fields: CandidateArgs,
    },

    /// Edit a candidate; only the given fields change
    Edit {
        /// Candidate ID
        id: i64,

        #[command(flatten)]
        fields: CandidateArgs,
    },

    /// List candidates
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the matching list again every time it changes (Ctrl-C to stop)
    Watch {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show candidate details with the converted salary
    Show {
        /// Candidate ID
        id: i64,
    },

    /// Toggle the favorite mark
    Favorite {
        /// Candidate ID
        id: i64,
    },

    /// Delete a candidate
    Delete {
        /// Candidate ID
        id: i64,
    },

    /// Delete every candidate
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Insert the sample candidate
    Seed,
}

#[derive(Args)]
struct CandidateArgs {
    #[arg(long)]
    first_name: Option<String>,

    #[arg(long)]
    last_name: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    email: Option<String>,

    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    birth_date: Option<String>,

    /// Expected salary in the home currency
    #[arg(long)]
    salary: Option<u32>,

    #[arg(long)]
    note: Option<String>,

    /// Image file stored as the candidate photo
    #[arg(long)]
    photo: Option<PathBuf>,

    /// Mark (true) or unmark (false) as favorite
    #[arg(long)]
    favorite: Option<bool>,
}

impl CandidateArgs {
    /// Overlays the given fields onto `form`.
    fn apply(self, form: &mut CandidateForm) -> Result<()> {
        if let Some(v) = self.first_name {
            form.first_name = v;
        }
        if let Some(v) = self.last_name {
            form.last_name = v;
        }
        if let Some(v) = self.phone {
            form.phone_number = v;
        }
        if let Some(v) = self.email {
            form.email = v;
        }
        if let Some(v) = self.birth_date {
            form.date_of_birth = Some(parse_birth_date(&v)?);
        }
        if let Some(v) = self.salary {
            form.expected_salary = v;
        }
        if let Some(v) = self.note {
            form.note = Some(v);
        }
        if let Some(path) = self.photo {
            form.photo = std::fs::read(&path)
                .with_context(|| format!("Failed to read photo: {}", path.display()))?;
        }
        if let Some(v) = self.favorite {
            form.is_favorite = v;
        }
        Ok(())
    }
}

#[derive(Args)]
struct FilterArgs {
    /// Only favorites
    #[arg(long, conflicts_with = "others")]
    favorites: bool,

    /// Only non-favorites
    #[arg(long)]
    others: bool,

    /// Substring of the first or last name
    #[arg(short, long)]
    name: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> CandidateFilter {
        let favorite = match (self.favorites, self.others) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        CandidateFilter::new(favorite, self.name.as_deref())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vitesse=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.db {
        config.database_path = path;
    }

    let store = CandidateStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path.display()))?;
    let rates = CurrencyClient::new(
        &config.currency_api_url,
        &config.base_currency,
        config.http_timeout,
    )?;
    let app = CandidateUseCases::new(store, rates, &config.target_currency);

    match cli.command {
        Commands::Init => {
            let count = app.store().count().await?;
            println!(
                "Database ready at {} ({} candidates)",
                config.database_path.display(),
                count
            );
        }

        Commands::Add { fields } => {
            let mut form = CandidateForm::default();
            fields.apply(&mut form)?;
            let id = app.insert(form).await?;
            println!("Added candidate #{}", id);
        }

        Commands::Edit { id, fields } => match app.store().fetch_by_id(id).await? {
            Some(current) => {
                let mut form = CandidateForm::from(current);
                fields.apply(&mut form)?;
                let updated = app.update(form).await?;
                if updated > 0 {
                    println!("Updated candidate #{}", id);
                } else {
                    println!("Candidate #{} not found.", id);
                }
            }
            None => println!("Candidate #{} not found.", id),
        },

        Commands::List { filter, json } => {
            let mut live = app.get_filtered(filter.into_filter())?;
            let candidates = live
                .next()
                .await
                .ok_or_else(|| anyhow!("Candidate store closed"))??;
            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                print_table(&candidates);
            }
        }

        Commands::Watch { filter } => {
            let mut live = app.get_filtered(filter.into_filter())?;
            loop {
                tokio::select! {
                    snapshot = live.next() => match snapshot {
                        Some(candidates) => {
                            println!("--- {} ---", Utc::now().format("%H:%M:%S"));
                            print_table(&candidates?);
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }

        Commands::Show { id } => {
            let mut live = app.get_by_id(id)?;
            let candidate = live
                .next()
                .await
                .ok_or_else(|| anyhow!("Candidate store closed"))??;
            match candidate {
                Some(candidate) => show_candidate(&app, &candidate, &config.base_currency).await?,
                None => println!("Candidate #{} not found.", id),
            }
        }

        Commands::Favorite { id } => match app.toggle_favorite(id).await? {
            Some(true) => println!("Candidate #{} marked as favorite.", id),
            Some(false) => println!("Candidate #{} removed from favorites.", id),
            None => println!("Candidate #{} not found.", id),
        },

        Commands::Delete { id } => {
            if app.delete(id).await? > 0 {
                println!("Deleted candidate #{}", id);
            } else {
                println!("Candidate #{} not found.", id);
            }
        }

        Commands::Clear { yes } => {
            if yes {
                let deleted = app.delete_all().await?;
                println!("Deleted {} candidate(s)", deleted);
            } else {
                println!("Refusing to delete every candidate without --yes");
            }
        }

        Commands::Seed => {
            let id = app.seed_sample().await?;
            println!("Added sample candidate #{}", id);
        }
    }

    Ok(())
}

async fn show_candidate<R: RateProvider>(
    app: &CandidateUseCases<R>,
    candidate: &Candidate,
    base_currency: &str,
) -> Result<()> {
    let star = if candidate.is_favorite { " *" } else { "" };
    println!("Candidate #{}{}", candidate.id, star);
    println!("Name: {}", candidate.full_name());
    println!(
        "Born: {} ({} years)",
        candidate.birth_date_display(),
        candidate.age_on(Utc::now().date_naive())
    );
    println!("Phone: {}", candidate.phone_number);
    println!("Email: {}", candidate.email);
    if !candidate.photo.is_empty() {
        println!("Photo: {} bytes", candidate.photo.len());
    }

    let salary = format!("{} {}", candidate.expected_salary, base_currency.to_uppercase());
    match app.convert_salary(candidate.expected_salary).await {
        Ok(converted) => println!("Expected salary: {} (about {})", salary, converted),
        Err(CandidateError::ConversionUnavailable { currency }) => println!(
            "Expected salary: {} ({} rate unavailable)",
            salary,
            currency.to_uppercase()
        ),
        Err(err) => return Err(err.into()),
    }

    if !candidate.note.is_empty() {
        println!("\n--- Note ---\n{}", candidate.note);
    }
    Ok(())
}

fn print_table(candidates: &[Candidate]) {
    if candidates.is_empty() {
        println!("No candidates found.");
        return;
    }
    println!(
        "{:<6} {:<3} {:<22} {:<22} {:>10}",
        "ID", "FAV", "LAST NAME", "FIRST NAME", "SALARY"
    );
    println!("{}", "-".repeat(67));
    for c in candidates {
        println!(
            "{:<6} {:<3} {:<22} {:<22} {:>10}",
            c.id,
            if c.is_favorite { "*" } else { "" },
            truncate(&c.last_name, 20),
            truncate(&c.first_name, 20),
            c.expected_salary
        );
    }
}

fn parse_birth_date(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid birth date '{}', expected YYYY-MM-DD", raw))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
