// src/cli.rs

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::{Subject, TokenCodec};
use crate::bridge::AuthSessionBridge;
use crate::config::AppConfig;
use crate::models::{user, Alias, NewOrganization, NewUser, PasswordHash, PermissionKey, RoleKey};
use crate::raddb::RadDB;
use crate::rbac::{Actor, RoleAdministration};
use crate::repository::{OrganizationRepository, RbacRepository, UserRepository};
use crate::session::MemorySessionStore;
use crate::store::AuthStore;
use crate::tenancy::OrganizationMembership;
use crate::web::{run_web_server, AppState};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "dashauth", author, version, about = "Multi-tenant dashboard authentication", long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Write a configuration file with a fresh master key and token secret
    Init {
        #[arg(long, default_value = "dashauth.yaml")]
        output: PathBuf,
        #[arg(long, default_value = "data/dashauth.db")]
        db_path: String,
    },
    /// Run the web server
    Serve,
    /// Seed the system organization and the bootstrap user
    Bootstrap {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    User {
        #[command(subcommand)]
        cmd: UserCommand,
    },
    Org {
        #[command(subcommand)]
        cmd: OrgCommand,
    },
    Member {
        #[command(subcommand)]
        cmd: MemberCommand,
    },
    Role {
        #[command(subcommand)]
        cmd: RoleCommand,
    },
    Permission {
        #[command(subcommand)]
        cmd: PermissionCommand,
    },
    Token {
        #[command(subcommand)]
        cmd: TokenCommand,
    },
}

// === Subcommands ===

#[derive(clap::Subcommand)]
pub enum UserCommand {
    Create {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "en")]
        language: String,
    },
    Deactivate { id: i64 },
    Activate { id: i64 },
}

#[derive(clap::Subcommand)]
pub enum OrgCommand {
    Create {
        name: String,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    Deactivate { id: i64 },
    Activate { id: i64 },
}

#[derive(clap::Subcommand)]
pub enum MemberCommand {
    Add {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        organization: i64,
    },
    Remove {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        organization: i64,
    },
    List {
        #[arg(long)]
        user: i64,
    },
}

#[derive(clap::Subcommand)]
pub enum RoleCommand {
    /// KEY is `{alias}_{name}`
    Create {
        key: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Grant a permission to a role
    Grant { role: String, permission: String },
    /// Assign a role to a user
    Assign {
        #[arg(long)]
        user: i64,
        role: String,
    },
    /// Revoke a role from a user
    Revoke {
        #[arg(long)]
        user: i64,
        role: String,
    },
    /// List the roles defined under an alias
    List {
        #[arg(long)]
        alias: String,
    },
}

#[derive(clap::Subcommand)]
pub enum PermissionCommand {
    /// KEY is `{alias}_{name}`
    Create {
        key: String,
        #[arg(long, default_value = "General")]
        module: String,
    },
}

#[derive(clap::Subcommand)]
pub enum TokenCommand {
    Issue {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        organization: i64,
        /// Issue the long-lived internal variant
        #[arg(long)]
        internal: bool,
    },
}

// === Entry point ===

pub async fn run(cli: Cli, config: AppConfig) -> CliResult {
    if let Command::Init { output, db_path } = &cli.command {
        return init_config(config, output, db_path);
    }

    let store = Arc::new(open_store(&config)?);

    match cli.command {
        Command::Init { .. } => {}
        Command::Serve => serve(store, config).await?,
        Command::Bootstrap {
            username,
            email,
            password,
        } => {
            let report = store.bootstrap(&username, &email, PasswordHash::new_bcrypt(&password)?)?;
            println!(
                "bootstrap complete (organization created: {}, user created: {})",
                report.created_organization, report.created_user
            );
        }
        Command::User { cmd } => handle_user(cmd, &store)?,
        Command::Org { cmd } => handle_org(cmd, &store)?,
        Command::Member { cmd } => handle_member(cmd, &store)?,
        Command::Role { cmd } => handle_role(cmd, &store)?,
        Command::Permission { cmd } => handle_permission(cmd, &store)?,
        Command::Token { cmd } => handle_token(cmd, &store, &config)?,
    }

    Ok(())
}

fn init_config(mut config: AppConfig, output: &Path, db_path: &str) -> CliResult {
    if output.exists() {
        return Err(format!("{} already exists", output.display()).into());
    }
    config.db_path = Some(db_path.to_string());
    config.master_key_hex = Some(hex::encode(RadDB::generate_key()));
    config.security.jwt.secret_key = Some(hex::encode(RadDB::generate_key()));
    config.save(output)?;
    println!("configuration written to {}", output.display());
    Ok(())
}

fn open_store(config: &AppConfig) -> Result<AuthStore, Box<dyn std::error::Error>> {
    match (&config.db_path, config.master_key()?) {
        (Some(path), Some(key)) => Ok(AuthStore::open(path, &key)?),
        _ => {
            tracing::warn!("no db_path configured; using an in-memory store");
            Ok(AuthStore::in_memory())
        }
    }
}

async fn serve(store: Arc<AuthStore>, config: AppConfig) -> CliResult {
    let codec = Arc::new(TokenCodec::new(&config.token_settings()?)?);
    let state = AppState::new(
        AuthSessionBridge::new(codec, store),
        Arc::new(MemorySessionStore::new(
            config.session.max_sessions,
            config.session_idle_timeout(),
        )),
        config.session.clone(),
    );
    run_web_server(state, &config.web_server.address).await?;
    Ok(())
}

fn handle_user(cmd: UserCommand, store: &Arc<AuthStore>) -> CliResult {
    match cmd {
        UserCommand::Create {
            username,
            email,
            password,
            language,
        } => {
            user::validate_username(&username)?;
            user::validate_email(&email)?;
            let created = store.create_user(NewUser {
                username,
                email,
                password_hash: PasswordHash::new_bcrypt(&password)?,
                language,
            })?;
            println!("created user {} (id {})", created.username, created.id);
        }
        UserCommand::Deactivate { id } => {
            store.set_user_active(id, false)?;
            println!("user {} deactivated", id);
        }
        UserCommand::Activate { id } => {
            store.set_user_active(id, true)?;
            println!("user {} activated", id);
        }
    }
    Ok(())
}

fn handle_org(cmd: OrgCommand, store: &Arc<AuthStore>) -> CliResult {
    let tenancy = OrganizationMembership::new(store.clone());
    match cmd {
        OrgCommand::Create {
            name,
            alias,
            parent,
        } => {
            let org = store.create_organization(NewOrganization {
                name,
                parent_id: parent,
                alias: Alias::new(alias)?,
            })?;
            println!("created organization {} (id {}, alias {})", org.name, org.id, org.alias);
        }
        OrgCommand::Deactivate { id } => {
            tenancy.set_organization_active(id, false)?;
            println!("organization {} deactivated", id);
        }
        OrgCommand::Activate { id } => {
            tenancy.set_organization_active(id, true)?;
            println!("organization {} activated", id);
        }
    }
    Ok(())
}

fn handle_member(cmd: MemberCommand, store: &Arc<AuthStore>) -> CliResult {
    let tenancy = OrganizationMembership::new(store.clone());
    match cmd {
        MemberCommand::Add { user, organization } => {
            tenancy.add_member(user, organization)?;
            println!("user {} added to organization {}", user, organization);
        }
        MemberCommand::Remove { user, organization } => {
            tenancy.remove_member(user, organization)?;
            println!("user {} removed from organization {}", user, organization);
        }
        MemberCommand::List { user } => {
            for entry in tenancy.memberships(user)? {
                let marker = if entry.membership.is_selected() { "*" } else { " " };
                println!(
                    "{} {:>6}  {:<12} {}",
                    marker, entry.organization.id, entry.organization.alias, entry.organization.name
                );
            }
        }
    }
    Ok(())
}

fn handle_role(cmd: RoleCommand, store: &Arc<AuthStore>) -> CliResult {
    let admin = RoleAdministration::new(store.clone());
    match cmd {
        RoleCommand::Create { key, description } => {
            let role = admin.create_role(key.parse::<RoleKey>()?, description)?;
            println!("created role {}", role.key);
        }
        RoleCommand::Grant { role, permission } => {
            let role: RoleKey = role.parse()?;
            let permission: PermissionKey = permission.parse()?;
            admin.grant_permission(&role, &permission)?;
            println!("granted {} to {}", permission, role);
        }
        RoleCommand::Assign { user, role } => {
            let role: RoleKey = role.parse()?;
            admin.assign_role(Actor::Operator, user, &role)?;
            println!("assigned {} to user {}", role, user);
        }
        RoleCommand::Revoke { user, role } => {
            let role: RoleKey = role.parse()?;
            admin.revoke_role(Actor::Operator, user, &role)?;
            println!("revoked {} from user {}", role, user);
        }
        RoleCommand::List { alias } => {
            for role in store.roles_for_alias(&Alias::new(alias)?)? {
                let state = if role.is_active { "" } else { " (inactive)" };
                println!(
                    "{}{}  {}",
                    role.key,
                    state,
                    role.description.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn handle_permission(cmd: PermissionCommand, store: &Arc<AuthStore>) -> CliResult {
    let admin = RoleAdministration::new(store.clone());
    match cmd {
        PermissionCommand::Create { key, module } => {
            let permission = admin.create_permission(key.parse::<PermissionKey>()?, module)?;
            println!("created permission {} ({})", permission.key, permission.module);
        }
    }
    Ok(())
}

fn handle_token(cmd: TokenCommand, store: &Arc<AuthStore>, config: &AppConfig) -> CliResult {
    match cmd {
        TokenCommand::Issue {
            user,
            organization,
            internal,
        } => {
            let tenancy = OrganizationMembership::new(store.clone());
            if tenancy.selected_organization(user, organization)?.is_none() {
                return Err(format!(
                    "user {} has no selected membership in active organization {}",
                    user, organization
                )
                .into());
            }
            let codec = TokenCodec::new(&config.token_settings()?)?;
            let subject = Subject {
                user_id: user,
                organization_id: organization,
            };
            let token = if internal {
                codec.issue_internal(subject)?
            } else {
                codec.issue(subject)?
            };
            println!("{}", token);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_token_issue() {
        let cli = Cli::try_parse_from([
            "dashauth", "--config", "dashauth.yaml", "token", "issue", "--user", "2", "--organization",
            "3", "--internal",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("dashauth.yaml")));
        assert!(matches!(
            cli.command,
            Command::Token {
                cmd: TokenCommand::Issue {
                    user: 2,
                    organization: 3,
                    internal: true
                }
            }
        ));
    }
}
