use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mdk_audit::{AuditWriter, VerifyResult};
use mdk_config::{
    load_layered_yaml, report_unused_keys, ConfigProfile, DeskConfig, UnusedKeyPolicy,
};
use mdk_db::PgMemoStore;
use mdk_lifecycle::{privilege_names, LifecycleService};
use mdk_schemas::{Memo, MemoDraft, MemoFilter, MemoId, MemoStatus, User};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "mdk")]
#[command(about = "Memo desk CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> site...)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the privileges granted to a role
    Privileges {
        /// Role name (Nurse | Electrician | Plumber | Dean)
        role: String,
    },

    /// Memo lifecycle commands (Postgres-backed)
    Memo {
        #[command(subcommand)]
        cmd: MemoCmd,
    },

    /// User registration (Postgres-backed)
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum MemoCmd {
    /// Submit a new memo (status Pending, level 0)
    Create {
        #[arg(long, default_value = "")]
        title: String,

        #[arg(long = "raised-by")]
        raised_by: String,

        /// Nature of complaint
        #[arg(long)]
        complaint: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        ward: Option<String>,

        #[arg(long)]
        floor: Option<String>,

        #[arg(long = "duty-timing")]
        duty_timing: Option<String>,

        /// Repeatable: --department Plumbing --department Civil
        #[arg(long = "department")]
        departments: Vec<String>,
    },

    /// Print one memo
    Show {
        #[arg(long)]
        id: String,
    },

    /// List memos, optionally filtered
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long = "assigned-to")]
        assigned_to: Option<String>,
    },

    /// Pending -> Approved
    Approve {
        #[arg(long)]
        id: String,

        #[arg(long = "assigned-to")]
        assigned_to: Option<String>,

        #[arg(long, default_value = mdk_audit::UNKNOWN_ACTOR)]
        actor: String,
    },

    /// Pending/Approved/Escalated -> Escalated, level + 1
    Escalate {
        #[arg(long)]
        id: String,

        #[arg(long, default_value = mdk_audit::UNKNOWN_ACTOR)]
        actor: String,
    },

    /// Approved/Escalated (with assignee) -> Completed
    Complete {
        #[arg(long)]
        id: String,

        #[arg(long, default_value = mdk_audit::UNKNOWN_ACTOR)]
        actor: String,
    },

    /// Approved/Escalated -> Withheld
    Withhold {
        #[arg(long)]
        id: String,

        #[arg(long)]
        reason: String,

        #[arg(long, default_value = mdk_audit::UNKNOWN_ACTOR)]
        actor: String,
    },

    /// Add a department tag (Approved/Escalated/Withheld)
    Tag {
        #[arg(long)]
        id: String,

        #[arg(long)]
        department: String,

        #[arg(long, default_value = mdk_audit::UNKNOWN_ACTOR)]
        actor: String,
    },
}

#[derive(Subcommand)]
enum UserCmd {
    Register {
        #[arg(long = "user-id")]
        user_id: String,

        #[arg(long)]
        phone: String,

        #[arg(long)]
        role: String,
    },

    Show {
        #[arg(long = "user-id")]
        user_id: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Walk a JSONL audit trail and check every hash link.
    Verify {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = mdk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = mdk_db::status(&pool).await?;
                    println!("db_ok={} has_memos_table={}", s.ok, s.has_memos_table);
                }
                DbCmd::Migrate => {
                    mdk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Privileges { role } => {
            println!("role={}", role);
            println!("privileges={}", privilege_names(&role).join(","));
        }

        Commands::Memo { cmd } => {
            let service = open_service(&cli.config_paths).await?;
            run_memo(&service, cmd).await?;
        }

        Commands::User { cmd } => {
            let service = open_service(&cli.config_paths).await?;
            match cmd {
                UserCmd::Register {
                    user_id,
                    phone,
                    role,
                } => {
                    let user = service.register_user(&user_id, &phone, &role).await?;
                    println!("registered=true");
                    print_user(&user);
                }
                UserCmd::Show { user_id } => {
                    let user = service.get_user(&user_id).await?;
                    print_user(&user);
                }
            }
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match mdk_audit::verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("chain_valid=true lines={} path={}", lines, path);
                }
                VerifyResult::Broken { line, reason } => {
                    println!("chain_valid=false line={} path={}", line, path);
                    bail!("audit chain broken at line {}: {}", line, reason);
                }
            },
        },
    }

    Ok(())
}

async fn run_memo(service: &LifecycleService, cmd: MemoCmd) -> Result<()> {
    match cmd {
        MemoCmd::Create {
            title,
            raised_by,
            complaint,
            description,
            ward,
            floor,
            duty_timing,
            departments,
        } => {
            let actor = raised_by.clone();
            let draft = MemoDraft {
                title,
                description,
                nature_of_complaint: complaint,
                raised_by,
                ward,
                floor,
                duty_timing,
                departments,
            };
            let memo = service.submit(draft, &actor).await?;
            println!("created=true");
            print_memo(&memo);
        }

        MemoCmd::Show { id } => {
            let memo = service.get(parse_memo_id(&id)?).await?;
            print_memo(&memo);
        }

        MemoCmd::List {
            status,
            assigned_to,
        } => {
            let status = status.as_deref().map(MemoStatus::parse).transpose()?;
            let filter = MemoFilter {
                status,
                assigned_to,
            };
            let memos = service.list(&filter).await?;
            println!("count={}", memos.len());
            for m in &memos {
                println!(
                    "memo_id={} status={} level={} assigned_to={} title={}",
                    m.id,
                    m.status.as_str(),
                    m.escalation_level,
                    m.assigned_to.as_deref().unwrap_or(""),
                    m.title
                );
            }
        }

        MemoCmd::Approve {
            id,
            assigned_to,
            actor,
        } => {
            let memo = service
                .approve(parse_memo_id(&id)?, assigned_to, &actor)
                .await?;
            print_memo(&memo);
        }

        MemoCmd::Escalate { id, actor } => {
            let memo = service.escalate(parse_memo_id(&id)?, &actor).await?;
            print_memo(&memo);
        }

        MemoCmd::Complete { id, actor } => {
            let memo = service.mark_complete(parse_memo_id(&id)?, &actor).await?;
            print_memo(&memo);
        }

        MemoCmd::Withhold { id, reason, actor } => {
            let memo = service
                .withhold(parse_memo_id(&id)?, reason, &actor)
                .await?;
            print_memo(&memo);
        }

        MemoCmd::Tag {
            id,
            department,
            actor,
        } => {
            let memo = service
                .tag_department(parse_memo_id(&id)?, department, &actor)
                .await?;
            print_memo(&memo);
        }
    }
    Ok(())
}

/// Postgres-backed service from layered config. Audit trail attached when
/// `audit.path` is set.
async fn open_service(config_paths: &[String]) -> Result<LifecycleService> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&path_refs)?;
    let cfg: DeskConfig = loaded.desk()?;

    init_tracing(&cfg.logging.filter);

    let unused = report_unused_keys(
        ConfigProfile::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    for key in &unused.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }

    let url = cfg.resolve_database_url()?;
    let pool = mdk_db::connect(&url, cfg.store.max_connections).await?;
    mdk_db::migrate(&pool).await?;

    let service = LifecycleService::from_store(Arc::new(PgMemoStore::new(pool)));
    Ok(match &cfg.audit.path {
        Some(path) => {
            let writer = AuditWriter::resume(path, cfg.audit.hash_chain)
                .with_context(|| format!("open audit trail {path}"))?;
            service.with_audit(writer)
        }
        None => service,
    })
}

/// Logs go to stderr so stdout stays `key=value`.
fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}

fn parse_memo_id(raw: &str) -> Result<MemoId> {
    raw.parse::<MemoId>().context("invalid memo id")
}

fn print_memo(m: &Memo) {
    println!("memo_id={}", m.id);
    println!("title={}", m.title);
    println!("raised_by={}", m.raised_by);
    println!("nature_of_complaint={}", m.nature_of_complaint);
    println!("status={}", m.status.as_str());
    println!("escalation_level={}", m.escalation_level);
    println!("assigned_to={}", m.assigned_to.as_deref().unwrap_or(""));
    println!("tagged_departments={}", m.tagged_departments.join(","));
    println!("notes={}", m.notes.as_deref().unwrap_or(""));
    println!("updated_at_utc={}", m.updated_at_utc.to_rfc3339());
}

fn print_user(u: &User) {
    let privileges: Vec<&str> = u.privileges.iter().map(|p| p.as_str()).collect();
    println!("user_id={}", u.user_id);
    println!("phone={}", u.phone);
    println!("role={}", u.role.as_str());
    println!("privileges={}", privileges.join(","));
}
