//! `esc-harness` command-line entry point

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use esc_client::ClientGeneration;
use esc_harness::{
    init_tracing, Harness, HarnessConfig, LogFormat, TestGroup, TestMatrix, EXIT_CONFIG,
};
use esc_negotiation::{
    ContentTypePolicy, Headers, NegotiationShim, OverrideMediaType, ServerEpoch, ACCEPT, CONTENT_TYPE,
};
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("esc-harness")
        .version(esc_harness::VERSION)
        .about("Content-type negotiation compatibility harness")
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(value_parser!(LogFormat))
                .help("Log line format: text or json"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Run the compatibility matrix against the server fleet")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(endpoint_arg(ServerEpoch::V7))
                .arg(endpoint_arg(ServerEpoch::V8))
                .arg(endpoint_arg(ServerEpoch::V9))
                .arg(
                    Arg::new("client-generation")
                        .long("client-generation")
                        .value_parser(value_parser!(ClientGeneration))
                        .help("Client generation to emulate (7, 8 or 9)"),
                )
                .arg(
                    Arg::new("group")
                        .long("group")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(TestGroup))
                        .help("Only run this group (repeatable)"),
                )
                .arg(
                    Arg::new("epoch")
                        .long("epoch")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(ServerEpoch))
                        .help("Only target this epoch (repeatable)"),
                )
                .arg(
                    Arg::new("index-prefix")
                        .long("index-prefix")
                        .help("Prefix for created indices"),
                )
                .arg(
                    Arg::new("start-cmd")
                        .long("start-cmd")
                        .help("Shell command that starts the fleet"),
                )
                .arg(
                    Arg::new("teardown-cmd")
                        .long("teardown-cmd")
                        .help("Shell command that stops the fleet"),
                )
                .arg(
                    Arg::new("sequential")
                        .long("sequential")
                        .action(ArgAction::SetTrue)
                        .help("Run epochs one after another"),
                )
                .arg(
                    Arg::new("no-cleanup")
                        .long("no-cleanup")
                        .action(ArgAction::SetTrue)
                        .help("Keep the indices this run created"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("matrix")
                .about("List the test cases that would run")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("negotiate")
                .about("Show the headers the shim would transmit")
                .arg(
                    Arg::new("content-type")
                        .long("content-type")
                        .required(true)
                        .help("Intended Content-Type"),
                )
                .arg(Arg::new("accept").long("accept").help("Intended Accept"))
                .arg(
                    Arg::new("epoch")
                        .long("epoch")
                        .value_parser(value_parser!(ServerEpoch))
                        .help("Detected server epoch; omit to simulate failed detection"),
                )
                .arg(
                    Arg::new("override")
                        .long("override")
                        .value_parser(value_parser!(OverrideMediaType))
                        .help("Explicit content type override"),
                )
                .arg(
                    Arg::new("fallback")
                        .long("fallback")
                        .action(ArgAction::SetTrue)
                        .help("Enable the fallback flag"),
                ),
        )
}

fn endpoint_arg(epoch: ServerEpoch) -> Arg {
    let name: &'static str = match epoch {
        ServerEpoch::V7 => "endpoint-v7",
        ServerEpoch::V8 => "endpoint-v8",
        ServerEpoch::V9 => "endpoint-v9",
    };
    Arg::new(name).long(name).help(format!("Base URL of the {} ({epoch}) server", epoch.label()))
}

fn load_config(args: &ArgMatches) -> anyhow::Result<HarnessConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => HarnessConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    for epoch in ServerEpoch::ALL {
        if let Some(url) = args.get_one::<String>(&format!("endpoint-{epoch}")) {
            config.endpoints.set(epoch, url.clone());
        }
    }
    if let Some(generation) = args.get_one::<ClientGeneration>("client-generation") {
        config.client_generation = *generation;
    }
    if let Some(groups) = args.get_many::<TestGroup>("group") {
        config.groups = groups.copied().collect();
    }
    if let Some(epochs) = args.get_many::<ServerEpoch>("epoch") {
        config.epochs = epochs.copied().collect();
    }
    if let Some(prefix) = args.get_one::<String>("index-prefix") {
        config.index_prefix.clone_from(prefix);
    }
    if let Some(command) = args.get_one::<String>("start-cmd") {
        config.cluster.start = Some(command.clone());
    }
    if let Some(command) = args.get_one::<String>("teardown-cmd") {
        config.cluster.teardown = Some(command.clone());
    }
    if args.get_flag("sequential") {
        config.sequential = true;
    }
    if args.get_flag("no-cleanup") {
        config.cleanup = false;
    }

    config.validate()?;
    Ok(config)
}

async fn run(args: &ArgMatches) -> i32 {
    let config = match load_config(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return EXIT_CONFIG;
        }
    };

    let matrix = TestMatrix::reference().filter(&config.groups, &config.epochs);
    match Harness::new(config, matrix).run().await {
        Ok(report) => {
            if args.get_flag("json") {
                match report.to_json() {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("error: cannot serialize report: {err}"),
                }
            } else {
                println!("{}", report.render_text());
            }
            report.exit_code()
        }
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

fn list_matrix(args: &ArgMatches) -> anyhow::Result<()> {
    let matrix = TestMatrix::reference();
    if args.get_flag("json") {
        let cases: Vec<_> = matrix.cases().iter().map(AsRef::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(());
    }

    println!("{:<18} {:<13} {:<6} {:>6}  OPTIONS", "CASE", "GROUP", "EPOCH", "WRITES");
    for case in matrix.cases() {
        let options: Vec<String> = case.extra_config.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!(
            "{:<18} {:<13} {:<6} {:>6}  {}",
            case.name,
            case.group.as_str(),
            case.epoch.label(),
            case.write_count,
            if options.is_empty() { "-".to_string() } else { options.join(" ") }
        );
    }
    Ok(())
}

fn negotiate(args: &ArgMatches) {
    let mut intended = Headers::new();
    if let Some(content_type) = args.get_one::<String>("content-type") {
        intended.insert(CONTENT_TYPE, content_type.clone());
    }
    if let Some(accept) = args.get_one::<String>("accept") {
        intended.insert(ACCEPT, accept.clone());
    }

    let mut policy = ContentTypePolicy::new().with_fallback(args.get_flag("fallback"));
    if let Some(media) = args.get_one::<OverrideMediaType>("override") {
        policy = policy.with_override(*media);
    }
    let detected = args.get_one::<ServerEpoch>("epoch").copied();

    let resolved = NegotiationShim::new().resolve(Some(&intended), &policy, detected);
    for (key, value) in resolved.iter() {
        println!("{key}: {value}");
    }
}

#[tokio::main]
async fn main() {
    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { EXIT_CONFIG } else { 0 });
        }
    };
    let log_format = matches.get_one::<LogFormat>("log-format").copied().unwrap_or_default();
    init_tracing(log_format, "info");

    let code = match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("matrix", args)) => match list_matrix(args) {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("error: {err:#}");
                EXIT_CONFIG
            }
        },
        Some(("negotiate", args)) => {
            negotiate(args);
            0
        }
        _ => EXIT_CONFIG,
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let matches = cli()
            .try_get_matches_from([
                "esc-harness",
                "run",
                "--endpoint-v8",
                "http://es8:9200",
                "--client-generation",
                "8",
                "--group",
                "bulk",
                "--epoch",
                "v7",
                "--epoch",
                "v8",
                "--sequential",
                "--no-cleanup",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let config = load_config(args).unwrap();

        assert_eq!(config.endpoint(ServerEpoch::V8), Some("http://es8:9200"));
        assert_eq!(config.client_generation, ClientGeneration::V8);
        assert_eq!(config.groups, vec![TestGroup::Bulk]);
        assert_eq!(config.epochs, vec![ServerEpoch::V7, ServerEpoch::V8]);
        assert!(config.sequential);
        assert!(!config.cleanup);
    }

    #[test]
    fn bad_prefix_fails_validation() {
        let matches = cli()
            .try_get_matches_from(["esc-harness", "run", "--index-prefix", "UPPER"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(load_config(args).is_err());
    }

    #[test]
    fn unknown_epoch_is_usage_error() {
        let err = cli()
            .try_get_matches_from(["esc-harness", "run", "--epoch", "v6"])
            .unwrap_err();
        assert!(err.use_stderr());
    }
}
