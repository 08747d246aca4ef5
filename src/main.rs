use clap::{Arg, Command};
use log::LevelFilter;
use phishtrap::llm::HttpLanguageModel;
use phishtrap::{AnalysisEngine, AnalysisResult, Config, KnowledgeBase, LanguageModel, Message};
use std::io::Read;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishtrap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-signal phishing detection ensemble")
        .long_about(
            "Analyzes a message (sender, subject, body, optional HTML) and produces a \
             structured phishing verdict by fusing four signals:\n\
             • URL extraction and domain risk scoring\n\
             • Psychological manipulation tactic detection\n\
             • Brand impersonation inference\n\
             • LLM-assisted content analysis with graceful degradation",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (YAML); defaults apply when omitted")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("knowledge-base")
                .long("knowledge-base")
                .value_name("FILE")
                .help("Knowledge base YAML (brands, blocklist, TLDs, exemplars)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a commented default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("message")
                .short('m')
                .long("message")
                .value_name("FILE")
                .help("Analyze a JSON message document (use '-' for stdin)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("sender")
                .long("sender")
                .value_name("ADDRESS")
                .help("Sender address for an inline message")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .help("Subject for an inline message")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("content")
                .long("content")
                .value_name("TEXT")
                .help("Body text for an inline message")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("Analyze a built-in batch of sample messages and show statistics")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-llm")
                .long("no-llm")
                .help("Skip the language-model signal (heuristics only)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-signal detail")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        generate_default_config(path);
        return;
    }

    let config = match matches.get_one::<String>("config") {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {e:#}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let kb_path = matches
        .get_one::<String>("knowledge-base")
        .map(|s| s.as_str())
        .or(config.knowledge_base.as_deref());
    let kb = Arc::new(KnowledgeBase::load_or_default(kb_path));

    let model: Option<Arc<dyn LanguageModel>> =
        if matches.get_flag("no-llm") || !config.llm.enabled {
            None
        } else {
            match HttpLanguageModel::from_config(&config.llm) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    log::warn!("Language model client unavailable ({e:#}); degrading");
                    None
                }
            }
        };

    let engine = AnalysisEngine::new(config, kb, model);

    if matches.get_flag("demo") {
        run_demo(&engine).await;
        return;
    }

    let message = match build_message(&matches) {
        Ok(message) => message,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };

    match engine.analyze(&message).await {
        Ok(result) => print_result(&result),
        Err(e) => {
            eprintln!("Analysis rejected: {e:#}");
            process::exit(1);
        }
    }
}

/// Message from --message FILE (JSON, '-' = stdin) or the inline flags.
fn build_message(matches: &clap::ArgMatches) -> anyhow::Result<Message> {
    if let Some(path) = matches.get_one::<String>("message") {
        let raw = if path == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| anyhow::anyhow!("failed to read stdin: {e}"))?;
            buf
        } else {
            std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read message file {path}: {e}"))?
        };
        let message: Message = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid message document: {e}"))?;
        return Ok(message);
    }

    let content = matches.get_one::<String>("content");
    if content.is_none() && matches.get_one::<String>("subject").is_none() {
        anyhow::bail!(
            "nothing to analyze; pass --message FILE or --content/--subject (see --help)"
        );
    }

    Ok(Message {
        content: content.cloned().unwrap_or_default(),
        sender: matches
            .get_one::<String>("sender")
            .cloned()
            .unwrap_or_default(),
        subject: matches.get_one::<String>("subject").cloned(),
        html: None,
    })
}

fn print_result(result: &AnalysisResult) {
    match serde_json::to_string_pretty(result) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize result: {e}"),
    }
    let verdict = if result.is_suspicious {
        "⚠️  SUSPICIOUS"
    } else {
        "✅ clean"
    };
    println!(
        "{verdict} (confidence {:.0}%, {:.3}s)",
        result.confidence * 100.0,
        result.analysis_time
    );
}

async fn run_demo(engine: &AnalysisEngine) {
    let samples = vec![
        Message::new(
            "support@paypa1-secure.com",
            Some("Account notice"),
            "Verify your account",
        ),
        Message::new(
            "alerts@billing-center.xyz",
            Some("URGENT"),
            "URGENT: Your account will be suspended in 24 hours unless you act now!",
        ),
        Message::new(
            "helpdesk@micros0ft-support.net",
            Some("Microsoft security alert"),
            "Microsoft detected unusual sign-in activity. Verify your identity at \
             http://micros0ft-support.net/verify immediately.",
        ),
        Message::new(
            "colleague@company.com",
            Some("Weekly report"),
            "Hi team, attached is this week's report, thanks!",
        ),
    ];

    println!("🔍 Running demo batch ({} messages)...", samples.len());
    println!();

    for message in &samples {
        match engine.analyze(message).await {
            Ok(result) => {
                let verdict = if result.is_suspicious {
                    "⚠️  SUSPICIOUS"
                } else {
                    "✅ clean"
                };
                println!("From:    {}", message.sender);
                println!(
                    "Subject: {}",
                    message.subject.as_deref().unwrap_or("(none)")
                );
                println!(
                    "Verdict: {verdict} (confidence {:.0}%)",
                    result.confidence * 100.0
                );
                for reason in &result.reasons {
                    println!("  • {reason}");
                }
                if let Some(brand) = &result.impersonated_brand {
                    println!("  Impersonated brand: {brand}");
                }
                println!();
            }
            Err(e) => println!("Analysis rejected: {e:#}"),
        }
    }

    let snap = engine.stats().snapshot();
    println!("📊 Statistics");
    println!("═══════════════════════════════════════");
    println!("  System status:        {}", snap.system_status);
    println!("  Total analyses:       {}", snap.total_analyses);
    println!("  Phishing detected:    {}", snap.phishing_detected);
    println!("  Clean messages:       {}", snap.clean_messages);
    println!("  Phishing percentage:  {:.1}%", snap.phishing_percentage);
    println!("  Average confidence:   {:.2}", snap.average_confidence);
    println!(
        "  Average analysis time: {:.3}s",
        snap.average_analysis_time
    );
    if !snap.top_tactics.is_empty() {
        println!("  Top tactics:");
        for tactic in &snap.top_tactics {
            println!("    {} ({})", tactic.name, tactic.count);
        }
    }
    if !snap.top_impersonated_brands.is_empty() {
        println!("  Top impersonated brands:");
        for brand in &snap.top_impersonated_brands {
            println!("    {} ({})", brand.name, brand.count);
        }
    }
}

fn generate_default_config(path: &str) {
    match std::fs::write(path, Config::default_yaml()) {
        Ok(()) => println!("✅ Default configuration written to {path}"),
        Err(e) => {
            eprintln!("Failed to write configuration file: {e}");
            process::exit(1);
        }
    }
}
