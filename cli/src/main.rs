use anyhow::{anyhow, Context};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::ASCII_FULL, Table};
use gcpsec_core::{
    create_resource, lint_doc_index, lint_template_schema, load_all, parse_template_schema,
    pluralize, resolve_parameters, type_from_name, Diagnostic, DiagnosticLevel, IamPolicy,
    LintReport, ResourceType, TemplateSchema, DEFAULT_QUICKSTART_TOPICS,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Deployment template linting and GCP resource / IAM policy tooling"
)]
struct GcpsecCli {
    /// Log filter directive, e.g. `info` or `gcpsec_core=debug`
    #[arg(long, global = true, env = "GCPSEC_LOG", default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lint a deployment template schema
    LintTemplate {
        /// Path to the schema file (YAML or JSON)
        input: PathBuf,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Check parameters against a template schema and print the resolved values
    CheckParams {
        /// Path to the schema file (YAML or JSON)
        input: PathBuf,
        /// Supply a parameter (format: key=value). Repeat for multiple parameters.
        #[arg(long = "param", value_parser = parse_key_val, value_name = "KEY=VALUE", action = ArgAction::Append)]
        params: Vec<(String, String)>,
        /// Output format; `yaml` prints the resolved values as a parameter file
        #[arg(long, value_enum, default_value_t = ParamsFormat::Text)]
        format: ParamsFormat,
    },
    /// Check that a documentation index links every quickstart topic
    LintDocs {
        /// Path to the Markdown index
        input: PathBuf,
        /// Topic that must be linked. Repeat for multiple topics; defaults to the builtin set.
        #[arg(long = "topic", action = ArgAction::Append)]
        topics: Vec<String>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Resource type utilities
    Resource {
        #[command(subcommand)]
        command: ResourceCommand,
    },
    /// IAM policy utilities
    Iam {
        #[command(subcommand)]
        command: IamCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ResourceCommand {
    /// List the known resource types
    Types {
        #[arg(long)]
        json: bool,
    },
    /// Print the plural label of a resource type
    Pluralize {
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,
    },
    /// Determine the resource type of a `{plural}/{id}` resource name
    TypeOf { name: String },
    /// Build a resource of the given type
    Create {
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List the resources of a type found in an inventory file
    List {
        #[arg(long = "type", value_parser = parse_resource_type)]
        resource_type: ResourceType,
        /// Path to the JSON inventory
        #[arg(long, env = "GCPSEC_INVENTORY")]
        inventory: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum IamCommand {
    /// Parse an IAM policy and print its bindings
    Parse {
        /// Path to the policy JSON
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the bindings of a policy that grant a role to a member
    Match {
        /// Path to the policy JSON
        input: PathBuf,
        /// Member to look up, e.g. `user:someone@company.com`
        #[arg(long)]
        member: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = GcpsecCli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::LintTemplate { input, json } => {
            let schema = load_template(&input)?;
            let diagnostics = lint_template_schema(&schema);
            let has_errors = output_lint(&input, diagnostics, json)?;
            if has_errors {
                anyhow::bail!("template schema validation failed");
            }
        }
        Command::CheckParams {
            input,
            params,
            format,
        } => {
            let schema = load_template(&input)?;
            let supplied: BTreeMap<String, Value> = params
                .into_iter()
                .map(|(key, raw)| {
                    let value = schema.parse_parameter(&key, &raw);
                    (key, value)
                })
                .collect();
            let resolution = resolve_parameters(&schema, &supplied);
            let has_errors = resolution.diagnostics.iter().any(Diagnostic::is_error);
            match format {
                ParamsFormat::Text => {
                    print_diagnostics(&resolution.diagnostics);
                    println!("Resolved parameters:");
                    for (key, value) in &resolution.values {
                        println!("  - {} = {}", key, value);
                    }
                }
                ParamsFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&resolution)?);
                }
                ParamsFormat::Yaml => {
                    print_diagnostics_to_stderr(&resolution.diagnostics);
                    print!("{}", serde_yaml::to_string(&resolution.values)?);
                }
            }
            if has_errors {
                anyhow::bail!("parameter validation failed");
            }
        }
        Command::LintDocs {
            input,
            topics,
            json,
        } => {
            let content = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let diagnostics = if topics.is_empty() {
                lint_doc_index(&content, DEFAULT_QUICKSTART_TOPICS)
            } else {
                lint_doc_index(&content, topics.as_slice())
            };
            let has_errors = output_lint(&input, diagnostics, json)?;
            if has_errors {
                anyhow::bail!("documentation index validation failed");
            }
        }
        Command::Resource { command } => run_resource(command)?,
        Command::Iam { command } => run_iam(command)?,
    }

    Ok(())
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("[warn] invalid log filter '{directive}': {err}; falling back to 'warn'");
        EnvFilter::new("warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_template(path: &Path) -> anyhow::Result<TemplateSchema> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let schema = parse_template_schema(&content)?;
    tracing::info!(
        path = %path.display(),
        required = schema.required.len(),
        properties = schema.properties.len(),
        "loaded template schema"
    );
    Ok(schema)
}

fn load_policy(path: &Path) -> anyhow::Result<IamPolicy> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(IamPolicy::create_from(&value)?)
}

fn output_lint(path: &Path, diagnostics: Vec<Diagnostic>, json: bool) -> anyhow::Result<bool> {
    let report = LintReport::new(path.display().to_string(), diagnostics);
    let has_errors = report.error_count > 0;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_diagnostics(&report.diagnostics);
        println!(
            "{}: {} error(s), {} warning(s)",
            report.source, report.error_count, report.warning_count
        );
    }

    Ok(has_errors)
}

fn run_resource(command: ResourceCommand) -> anyhow::Result<()> {
    match command {
        ResourceCommand::Types { json } => {
            if json {
                let types: Vec<Value> = ResourceType::all()
                    .map(|resource_type| {
                        json!({
                            "type": resource_type,
                            "plural": pluralize(resource_type),
                            "can_create_resource": resource_type.can_create_resource(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&types)?);
            } else {
                let mut table = Table::new();
                table.load_preset(ASCII_FULL);
                table.set_header(vec!["type", "plural", "creatable"]);
                for resource_type in ResourceType::all() {
                    table.add_row(vec![
                        resource_type.to_string(),
                        pluralize(resource_type).to_string(),
                        resource_type.can_create_resource().to_string(),
                    ]);
                }
                println!("{table}");
            }
        }
        ResourceCommand::Pluralize { resource_type } => {
            println!("{}", pluralize(resource_type));
        }
        ResourceCommand::TypeOf { name } => match type_from_name(&name) {
            Some(resource_type) => println!("{resource_type}"),
            None => anyhow::bail!("cannot determine the resource type of '{name}'"),
        },
        ResourceCommand::Create {
            resource_type,
            id,
            json,
        } => {
            let resource = create_resource(&id, resource_type)
                .ok_or_else(|| anyhow!("resources of type '{resource_type}' cannot be created"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resource)?);
            } else {
                println!("{}", resource.name);
            }
        }
        ResourceCommand::List {
            resource_type,
            inventory,
            json,
        } => {
            let resources = load_all(&inventory, resource_type)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else {
                println!("{} ({}):", pluralize(resource_type), resources.len());
                for resource in &resources {
                    match &resource.display_name {
                        Some(display) => println!("  - {} ({})", resource.name, display),
                        None => println!("  - {}", resource.name),
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_iam(command: IamCommand) -> anyhow::Result<()> {
    match command {
        IamCommand::Parse { input, json } => {
            let policy = load_policy(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&policy)?);
            } else if policy.is_empty() {
                println!("Policy has no bindings.");
            } else {
                println!("Bindings:");
                for binding in &policy.bindings {
                    println!("  - {binding}");
                }
            }
        }
        IamCommand::Match {
            input,
            member,
            json,
        } => {
            let policy = load_policy(&input)?;
            let bindings = policy.find_member_bindings(&member);
            tracing::debug!(%member, matched = bindings.len(), "looked up member bindings");
            if json {
                let payload: Vec<Value> = bindings
                    .iter()
                    .map(|binding| {
                        json!({
                            "role": binding.role_name,
                            "matched_by": binding.find_member(&member).map(ToString::to_string),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if bindings.is_empty() {
                println!("No bindings grant a role to {member}.");
            } else {
                for binding in bindings {
                    let via = binding
                        .find_member(&member)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    println!("  - {} (via {})", binding.role_name, via);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ParamsFormat {
    Text,
    Json,
    Yaml,
}

fn print_diagnostics_to_stderr(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let level = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warn",
        };
        eprintln!("[{level}] {}", diagnostic.message);
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }

    println!("Diagnostics:");
    for diagnostic in diagnostics {
        let level = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warn",
        };
        match &diagnostic.location {
            Some(location) => println!("  - [{level}] {location}: {}", diagnostic.message),
            None => println!("  - [{level}] {}", diagnostic.message),
        }
    }
    println!();
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].trim().is_empty() {
        return Err(format!("expected KEY=VALUE, got '{s}'"));
    }
    Ok((parts[0].trim().to_string(), parts[1].to_string()))
}

fn parse_resource_type(s: &str) -> Result<ResourceType, String> {
    s.parse::<ResourceType>().map_err(|err| err.to_string())
}
