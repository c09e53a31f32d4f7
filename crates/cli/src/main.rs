use anyhow::Context;
use api_shared::{parse_category, parse_flow_step, parse_priority, parse_template, HealthService};
use clap::{Parser, Subcommand};
use intake_core::{
    allocation_attempts_from_env_value, constants::DEFAULT_DATA_DIR, required_fields, validate,
    wizard_steps, Classification, CoreConfig, FileStore, FlowRouter, HospitalContext,
    HospitalIdConfig, HospitalKey, IdConfigService, IntakeError, NonEmptyText, PatientDraft,
    PatientIdAllocator, PatientRecordId, PatientService, RecordStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Hospital patient intake CLI")]
struct Cli {
    /// Member of staff recorded against changes
    #[arg(long, global = true)]
    actor: Option<String>,
    /// Hospital subdomain used by the hospital_prefix_number format (defaults to the key)
    #[arg(long, global = true)]
    subdomain: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the CLI is working
    Health,
    /// Show the effective priority and first step for a registration
    Classify {
        /// new, returning or emergency
        category: String,
        /// normal, urgent or critical
        #[arg(long)]
        priority: Option<String>,
    },
    /// List mandatory fields and wizard steps for a registration category
    RequiredFields { category: String },
    /// Validate a registration draft (YAML)
    Validate { draft: PathBuf },
    /// Show the default next step from a flow step
    NextStep {
        step: String,
        category: String,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Preview the next patient number without consuming it
    PreviewId { hospital: String },
    /// Consume the next patient number
    AllocateId {
        hospital: String,
        /// Sequence number for hospitals that number patients manually
        #[arg(long)]
        sequence: Option<u64>,
    },
    /// Show a hospital's patient-number settings
    ShowConfig { hospital: String },
    /// Create or change a hospital's patient-number settings
    SetConfig {
        hospital: String,
        /// prefix_number, prefix_year_number, hospital_prefix_number or custom
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        digit_width: Option<u32>,
        #[arg(long)]
        last_sequence: Option<u64>,
        /// Turn automatic numbering on or off
        #[arg(long)]
        auto_increment: Option<bool>,
    },
    /// Register a patient from a draft (YAML)
    Register {
        hospital: String,
        draft: PathBuf,
        #[arg(long)]
        sequence: Option<u64>,
    },
    /// Show a patient
    Show { hospital: String, id: String },
    /// Move a patient to the default next step
    Advance { hospital: String, id: String },
    /// Move a patient to a chosen step (pharmacy, billing, discharged, ...)
    Route {
        hospital: String,
        id: String,
        target: String,
    },
    /// Discharge a patient
    Discharge { hospital: String, id: String },
    /// Raise a patient's priority
    Escalate {
        hospital: String,
        id: String,
        priority: String,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'intake --help' for commands");
        return Ok(());
    };

    match command {
        Commands::Health => {
            let res = HealthService::check_health();
            println!("{}", res.message);
        }
        Commands::Classify { category, priority } => {
            let classification = classification(&category, priority.as_deref())?;
            let next = FlowRouter::next_step(intake_core::FlowStep::Registration, &classification)?;
            println!(
                "priority: {}\nemergency: {}\nnext step: {}",
                classification.effective_priority,
                classification.is_emergency(),
                next
            );
        }
        Commands::RequiredFields { category } => {
            let category = parse_category(&category)?;
            println!("Required fields:");
            for field in required_fields(category) {
                println!("  {field}");
            }
            println!("Wizard steps:");
            for step in wizard_steps(category) {
                println!("  {}. {}", step.number(), step.as_str());
            }
        }
        Commands::Validate { draft } => {
            let report = validate(&read_draft(&draft)?);
            if report.valid {
                println!("Draft is valid.");
            } else {
                for error in &report.errors {
                    println!("{}: {}", error.field, error.message);
                }
                anyhow::bail!("draft has {} error(s)", report.errors.len());
            }
        }
        Commands::NextStep {
            step,
            category,
            priority,
        } => {
            let classification = classification(&category, priority.as_deref())?;
            let step = parse_flow_step(&step)?;
            println!("{}", FlowRouter::next_step(step, &classification)?);
            let allowed: Vec<_> = FlowRouter::allowed_targets(step, &classification)
                .into_iter()
                .map(|s| s.as_str())
                .collect();
            println!("allowed: {}", allowed.join(", "));
        }
        Commands::PreviewId { hospital } => {
            let (cfg, store) = open_store()?;
            let ctx = context(&cli_opts(&cli.actor, &cli.subdomain), &hospital)?;
            println!("{}", IdConfigService::new(cfg, store).preview(&ctx)?);
        }
        Commands::AllocateId { hospital, sequence } => {
            let (cfg, store) = open_store()?;
            let ctx = context(&cli_opts(&cli.actor, &cli.subdomain), &hospital)?;
            let allocation = PatientIdAllocator::new(store.as_ref(), cfg.allocation_max_attempts())
                .allocate(&ctx, sequence)?;
            println!("{}", allocation.display_id);
        }
        Commands::ShowConfig { hospital } => {
            let (cfg, store) = open_store()?;
            let ctx = context(&cli_opts(&cli.actor, &cli.subdomain), &hospital)?;
            let config = IdConfigService::new(cfg, store).load(&ctx)?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::SetConfig {
            hospital,
            template,
            prefix,
            digit_width,
            last_sequence,
            auto_increment,
        } => {
            let (cfg, store) = open_store()?;
            let ctx = context(&cli_opts(&cli.actor, &cli.subdomain), &hospital)?;
            let service = IdConfigService::new(cfg, store);

            let mut config = match service.load(&ctx) {
                Ok(config) => config,
                Err(IntakeError::HospitalNotFound(_)) => HospitalIdConfig::default(),
                Err(e) => return Err(e.into()),
            };
            if let Some(template) = template {
                config.format_template = parse_template(&template)?;
            }
            if let Some(prefix) = prefix {
                config.prefix = prefix;
            }
            if let Some(width) = digit_width {
                config.digit_width = width;
            }
            if let Some(last) = last_sequence {
                config.last_sequence_number = last;
            }
            if let Some(auto) = auto_increment {
                config.auto_increment = auto;
            }

            let saved = service.save(&ctx, config)?;
            println!("Saved settings for {}; next id: {}", hospital, saved.preview(&ctx));
        }
        Commands::Register {
            hospital,
            draft,
            sequence,
        } => {
            let (cfg, store) = open_store()?;
            let ctx = context(&cli_opts(&cli.actor, &cli.subdomain), &hospital)?;
            let draft = read_draft(&draft)?;
            match PatientService::new(cfg, store).register(&ctx, &draft, sequence) {
                Ok(registered) => {
                    let p = &registered.patient;
                    println!(
                        "Registered {} ({}) as {}, priority {}, now at {}",
                        p.display_id, p.id, p.registration_category, p.priority_level, p.current_flow_step
                    );
                }
                Err(IntakeError::Validation(report)) => {
                    for error in &report.errors {
                        eprintln!("{}: {}", error.field, error.message);
                    }
                    anyhow::bail!("registration rejected");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Show { hospital, id } => {
            let (service, ctx, id) = patient_command(&cli.actor, &cli.subdomain, &hospital, &id)?;
            print!("{}", serde_yaml::to_string(&service.patient(&ctx, &id)?)?);
        }
        Commands::Advance { hospital, id } => {
            let (service, ctx, id) = patient_command(&cli.actor, &cli.subdomain, &hospital, &id)?;
            let p = service.advance(&ctx, &id)?;
            println!("{} is now at {}", p.display_id, p.current_flow_step);
        }
        Commands::Route {
            hospital,
            id,
            target,
        } => {
            let (service, ctx, id) = patient_command(&cli.actor, &cli.subdomain, &hospital, &id)?;
            let p = service.route_to(&ctx, &id, parse_flow_step(&target)?)?;
            println!("{} is now at {}", p.display_id, p.current_flow_step);
        }
        Commands::Discharge { hospital, id } => {
            let (service, ctx, id) = patient_command(&cli.actor, &cli.subdomain, &hospital, &id)?;
            let p = service.discharge(&ctx, &id)?;
            println!("{} discharged", p.display_id);
        }
        Commands::Escalate {
            hospital,
            id,
            priority,
        } => {
            let (service, ctx, id) = patient_command(&cli.actor, &cli.subdomain, &hospital, &id)?;
            let p = service.escalate_priority(&ctx, &id, parse_priority(&priority)?)?;
            println!("{} priority is {}", p.display_id, p.priority_level);
        }
    }

    Ok(())
}

struct ContextOpts<'a> {
    actor: Option<&'a str>,
    subdomain: Option<&'a str>,
}

fn cli_opts<'a>(actor: &'a Option<String>, subdomain: &'a Option<String>) -> ContextOpts<'a> {
    ContextOpts {
        actor: actor.as_deref(),
        subdomain: subdomain.as_deref(),
    }
}

fn context(opts: &ContextOpts<'_>, hospital: &str) -> anyhow::Result<HospitalContext> {
    let mut ctx = HospitalContext::new(HospitalKey::parse(hospital)?)
        .with_actor(NonEmptyText::from_optional(opts.actor));
    if let Some(subdomain) = opts.subdomain {
        ctx = ctx.with_subdomain(subdomain);
    }
    Ok(ctx)
}

fn classification(category: &str, priority: Option<&str>) -> anyhow::Result<Classification> {
    let category = parse_category(category)?;
    let requested = priority.map(parse_priority).transpose()?.unwrap_or_default();
    Ok(Classification::for_intake(category, requested))
}

fn open_store() -> anyhow::Result<(Arc<CoreConfig>, Arc<dyn RecordStore>)> {
    let data_dir = std::env::var("INTAKE_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let attempts =
        allocation_attempts_from_env_value(std::env::var("INTAKE_ALLOCATION_ATTEMPTS").ok())?;
    let cfg = Arc::new(CoreConfig::new(PathBuf::from(data_dir), attempts)?);
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(cfg.clone()));
    Ok((cfg, store))
}

fn patient_command(
    actor: &Option<String>,
    subdomain: &Option<String>,
    hospital: &str,
    id: &str,
) -> anyhow::Result<(PatientService, HospitalContext, PatientRecordId)> {
    let (cfg, store) = open_store()?;
    let ctx = context(&cli_opts(actor, subdomain), hospital)?;
    let id = PatientRecordId::parse(id)?;
    Ok((PatientService::new(cfg, store), ctx, id))
}

fn read_draft(path: &Path) -> anyhow::Result<PatientDraft> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("invalid draft {}", path.display()))
}
