//! rootara-traits CLI: genetic trait formulas and the trait repository.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use rootara_traits::backend::{self, BackendClient, GenotypeSource, StaticGenotypes};
use rootara_traits::config::{RootaraConfig, RootaraPaths};
use rootara_traits::evaluate;
use rootara_traits::formula::{self, Formula};
use rootara_traits::genotype::GenotypeTable;
use rootara_traits::interchange;
use rootara_traits::model::{Language, Trait, TraitCategory};
use rootara_traits::store::{TraitQuery, TraitRepository};
use rootara_traits::thresholds::{ScoreThresholds, Threshold};

#[derive(Parser)]
#[command(name = "rootara-traits", version, about = "Genetic trait formulas and results")]
struct Cli {
    /// Data directory for the trait database and extra catalogs.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/rootara/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep user traits in memory only for this invocation.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List built-in and user traits with their current result.
    List {
        /// Only traits in this category (appearance, internal, nutrition, risk, lifestyle).
        #[arg(long)]
        category: Option<TraitCategory>,

        /// Case-insensitive search in the trait name.
        #[arg(long)]
        search: Option<String>,

        /// Display language (en or zh-CN).
        #[arg(long)]
        lang: Option<Language>,
    },

    /// Show a trait in detail.
    Show {
        id: String,

        /// Print the raw JSON document instead.
        #[arg(long)]
        json: bool,

        /// Display language (en or zh-CN).
        #[arg(long)]
        lang: Option<Language>,
    },

    /// Evaluate a formula against ad-hoc genotypes.
    Eval {
        /// Formula, e.g. "SCORE(rs1:AA=5,AG=2)".
        #[arg(long)]
        formula: String,

        /// Genotype call as RSID=GENOTYPE (repeatable).
        #[arg(long = "genotype", value_parser = parse_pair)]
        genotypes: Vec<(String, String)>,

        /// Threshold as LABEL=VALUE, VALUE a number or true/false (repeatable).
        #[arg(long = "threshold", value_parser = parse_pair)]
        thresholds: Vec<(String, String)>,
    },

    /// Validate a formula strictly and print its canonical form.
    Check {
        #[arg(long)]
        formula: String,
    },

    /// Add a user trait from a JSON document.
    Add {
        #[arg(long)]
        file: PathBuf,
    },

    /// Remove a user trait.
    Remove { id: String },

    /// Import user traits from an export file.
    Import {
        #[arg(long)]
        file: PathBuf,
    },

    /// Export user traits as JSON.
    Export {
        /// Output file or directory. Prints to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Fetch a trait's genotypes for a report and show the result.
    Fetch {
        id: String,

        /// Report identifier known to the genomics backend.
        #[arg(long)]
        report: String,

        /// Use the bundled demo genotype table instead of the backend.
        #[arg(long)]
        demo: bool,
    },

    /// Inspect or write the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Write the default configuration file if none exists.
    Init,
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got \"{s}\""))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in \"{s}\""));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let base_paths = match RootaraPaths::resolve() {
        Ok(p) => p,
        Err(e) => match &cli.data_dir {
            Some(dir) => RootaraPaths {
                config_dir: dir.clone(),
                data_dir: dir.clone(),
            },
            None => return Err(e.into()),
        },
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| base_paths.config_file());
    let mut config = RootaraConfig::load_or_default(&config_path)?;
    config.apply_env()?;
    if let Some(dir) = &cli.data_dir {
        config.store.data_dir = Some(dir.clone());
    }
    if cli.memory {
        config.store.persistent = false;
    }
    let paths = base_paths.clone().with_data_dir(config.data_dir(&base_paths));

    let open_repo = || -> Result<TraitRepository> {
        if config.store.persistent {
            paths.ensure_dirs()?;
        }
        Ok(TraitRepository::open(&paths, config.store.persistent)?)
    };

    match cli.command {
        Commands::List {
            category,
            search,
            lang,
        } => {
            let repo = open_repo()?;
            let language = lang.unwrap_or(config.language);
            let traits = repo.query(&TraitQuery {
                category,
                search,
                language,
            })?;
            if traits.is_empty() {
                println!("No traits match.");
            } else {
                println!("Traits ({}):", traits.len());
                for t in &traits {
                    let marker = if t.is_default { ' ' } else { '*' };
                    println!(
                        " {marker}{:<28} {:<10} {} -> {}",
                        t.id,
                        t.category.display_name(language),
                        t.name.get(language),
                        display_result(t),
                    );
                }
            }
        }

        Commands::Show { id, json, lang } => {
            let repo = open_repo()?;
            let t = repo.get(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&t).into_diagnostic()?);
            } else {
                print_trait(&t, lang.unwrap_or(config.language));
            }
        }

        Commands::Eval {
            formula,
            genotypes,
            thresholds,
        } => {
            let (rsids, calls): (Vec<String>, Vec<String>) = genotypes.into_iter().unzip();
            let thresholds = thresholds
                .into_iter()
                .map(|(label, value)| {
                    value
                        .parse::<Threshold>()
                        .map(|t| (label, t))
                        .map_err(|e| miette::miette!("{e}"))
                })
                .collect::<Result<ScoreThresholds>>()?;

            if let Err(e) = Formula::parse_strict(&formula) {
                tracing::warn!("formula is not strictly valid, evaluating leniently: {e}");
            }
            let score = formula::evaluate(&formula, &rsids, &calls);
            println!("score: {score}");
            if !thresholds.is_empty() {
                println!("result: {}", thresholds.derive(score).unwrap_or("(none)"));
            }
            let table = GenotypeTable::new(&rsids, &calls);
            println!("called variants: {}/{}", table.called(), rsids.len());
        }

        Commands::Check { formula } => {
            let parsed = Formula::parse_strict(&formula)?;
            println!("ok: {parsed}");
            let rsids = parsed.referenced_rsids();
            if !rsids.is_empty() {
                println!("rsids: {}", rsids.join(", "));
            }
        }

        Commands::Add { file } => {
            let repo = open_repo()?;
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            let record: Trait = serde_json::from_str(&content).into_diagnostic()?;
            let stored = repo.add(record)?;
            println!("Added \"{}\" as {}", stored.name.get(config.language), stored.id);
            println!("  result: {}", display_result(&stored));
        }

        Commands::Remove { id } => {
            let repo = open_repo()?;
            let removed = repo.remove(&id)?;
            println!("Removed \"{}\" ({})", removed.name.get(config.language), removed.id);
        }

        Commands::Import { file } => {
            let repo = open_repo()?;
            let report = interchange::import_file(&repo, &file)?;
            println!("Imported {} trait(s) from {}", report.imported.len(), file.display());
            for (requested, assigned) in &report.renamed {
                println!("  id \"{requested}\" was taken, stored as {assigned}");
            }
        }

        Commands::Export { out } => {
            let repo = open_repo()?;
            let document = interchange::export_from(&repo)?;
            match out {
                Some(path) => {
                    let path = export_target(&path);
                    interchange::write_export(&path, &document)?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{document}"),
            }
        }

        Commands::Fetch { id, report, demo } => {
            let repo = open_repo()?;
            let mut t = repo.get(&id)?;
            let source: Box<dyn GenotypeSource> = if demo {
                Box::new(StaticGenotypes::demo())
            } else {
                Box::new(BackendClient::new(&config.backend))
            };
            let evaluation = backend::resolve_genotypes(&mut t, source.as_ref(), &report);
            print_trait(&t, config.language);
            println!("  score:      {}", evaluation.score);
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                println!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            }
            ConfigAction::Init => {
                if config_path.exists() {
                    println!("Config already exists at {}", config_path.display());
                } else {
                    RootaraConfig::default().save(&config_path)?;
                    println!("Wrote default config to {}", config_path.display());
                }
            }
        },
    }

    Ok(())
}

/// A directory target gets the dated default file name.
fn export_target(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(interchange::export_file_name(chrono::Local::now().date_naive()))
    } else {
        path.to_path_buf()
    }
}

fn display_result(t: &Trait) -> &str {
    if t.result_current.is_empty() {
        "(no result)"
    } else {
        &t.result_current
    }
}

fn print_trait(t: &Trait, language: Language) {
    println!("Trait: \"{}\"", t.name.get(language));
    println!("  id:         {}", t.id);
    println!("  category:   {}", t.category.display_name(language));
    println!("  built-in:   {}", t.is_default);
    if !t.created_at.is_empty() {
        println!("  created_at: {}", t.created_at);
    }
    println!("  result:     {}", display_result(t));
    let description = t.description.get(language);
    if !description.is_empty() {
        println!("  about:      {description}");
    }
    println!("  formula:    {}", t.formula);

    if !t.rsids.is_empty() {
        println!("  variants ({}):", t.rsids.len());
        for (i, rsid) in t.rsids.iter().enumerate() {
            let yours = t.your_genotypes.get(i).map_or("", String::as_str);
            let reference = t.reference_genotypes.get(i).map_or("", String::as_str);
            println!("    {rsid:<12} yours {yours:<4} reference {reference}");
        }
    }

    if !t.score_thresholds.is_empty() {
        println!("  thresholds:");
        for (label, threshold) in t.score_thresholds.iter() {
            println!("    {label:<24} {threshold}");
        }
    }

    if !t.reference.is_empty() {
        println!("  pubmed:     {}", t.reference.join(", "));
    }

    if let Err(e) = evaluate::check_formula(t) {
        tracing::warn!(trait_id = %t.id, "formula does not validate: {e}");
    }
}
