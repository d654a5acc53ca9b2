use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use image::DynamicImage;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use feedback_capture::annotation::SHORTCUTS;
use feedback_capture::capture::{
    capture_metadata, normalize_capture, CaptureOptions, ImageFileCapturer, ScreenCapturer,
    SystemCapturer,
};
use feedback_capture::client::FeedbackClient;
use feedback_capture::config::Config;
use feedback_capture::editor::{parse_script, AnnotationEditor};
use feedback_capture::feedback::{
    FeedbackCategory, FeedbackForm, FeedbackLabel, FeedbackPriority, FeedbackSubmission,
};
use feedback_capture::geometry::{parse_point, MIN_REGION_SIZE};
use feedback_capture::input::PointerInput;
use feedback_capture::region::{RegionEvent, RegionOutcome, RegionSelector};
use feedback_capture::render::decode_data_url;
use feedback_capture::report::issue_draft;
use feedback_capture::session::{CaptureMode, FeedbackSession, Notice, Phase, SubmitOutcome};
use feedback_capture::util::{
    abs_path, default_sidecar_for, ensure_parent_dir, read_input, timestamp_iso, write_json_pretty,
};
use feedback_capture::{diagnostics, logging};

const SCRIPT_HELP: &str = r##"Annotate script JSON (a list, or {"events": [...]}):
[
  {"event": "tool", "tool": "arrow"},
  {"event": "down", "kind": "mouse", "client_x": 40, "client_y": 30},
  {"event": "move", "kind": "mouse", "client_x": 180, "client_y": 120},
  {"event": "up"},
  {"event": "tool", "tool": "text"},
  {"event": "down", "kind": "mouse", "client_x": 60, "client_y": 200},
  {"event": "type", "text": "Overlaps the header"},
  {"event": "enter"},
  {"event": "key", "key": {"char": "z"}, "ctrl": true},
  {"event": "redo"}
]

Events: tool, down, move, up, leave, type, enter, escape, key, undo, redo, clear.
Pointer events take "kind": "mouse" with client_x/client_y, or "kind": "touch"
with "touches"/"changed_touches" lists of {client_x, client_y}.
"##;

#[derive(Parser, Debug)]
#[command(
    name = "feedback-capture",
    version,
    about = "Capture, select, annotate and submit in-app feedback with diagnostics"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Capture the screen and emit a metadata sidecar
    Capture(CaptureArgs),
    /// Drag-select a region of a screenshot and write the crop
    Select(SelectArgs),
    /// Replay an editor script over an image and write the composite
    Annotate(AnnotateArgs),
    /// Run the full feedback flow and submit it to the collector
    Feedback(FeedbackArgs),
    /// Render the issue a collector would file for a submission
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Output PNG path (default: <out dir>/capture/screen-*.png)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print capture metadata JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Custom metadata sidecar path (default: <out>.json)
    #[arg(long)]
    sidecar: Option<PathBuf>,
    /// Disable metadata sidecar generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_sidecar: bool,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// Screenshot PNG path
    input: PathBuf,
    /// Output PNG path for the crop
    output: PathBuf,
    /// Drag start in viewport pixels, as x,y
    #[arg(long)]
    from: String,
    /// Drag end in viewport pixels, as x,y
    #[arg(long)]
    to: String,
    /// Screenshot pixels per viewport pixel
    #[arg(long, default_value_t = 1.0)]
    dpr: f64,
    /// Also write the selection overlay as it looked before release
    #[arg(long)]
    preview_out: Option<PathBuf>,
    /// Print the selected region as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Input PNG path
    input: Option<PathBuf>,
    /// Output PNG path
    output: Option<PathBuf>,
    /// Editor script file path (or - for stdin)
    #[arg(long)]
    script: Option<String>,
    /// Path to write annotation metadata sidecar (default: <output>.json)
    #[arg(long)]
    meta_out: Option<PathBuf>,
    /// Disable metadata sidecar output
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
    /// Print script format and keyboard shortcuts, then exit
    #[arg(long, action = ArgAction::SetTrue)]
    script_help: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Full,
    Region,
    Text,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => CaptureMode::FullScreen,
            ModeArg::Region => CaptureMode::Region,
            ModeArg::Text => CaptureMode::TextOnly,
        }
    }
}

#[derive(Args, Debug)]
struct FeedbackArgs {
    /// Capture mode
    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    mode: ModeArg,
    /// Use this PNG instead of capturing the screen
    #[arg(long)]
    screenshot: Option<PathBuf>,
    /// Region drag start (region mode), as x,y
    #[arg(long)]
    from: Option<String>,
    /// Region drag end (region mode), as x,y
    #[arg(long)]
    to: Option<String>,
    /// Editor script applied to the screenshot (or - for stdin)
    #[arg(long)]
    script: Option<String>,
    /// bug, visual or suggestion
    #[arg(long, default_value = "bug")]
    category: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: String,
    /// urgent, high, medium, low or none
    #[arg(long)]
    priority: Option<String>,
    /// Repeatable: frontend, backend, mobile, design, performance, accessibility, ux
    #[arg(long = "label")]
    labels: Vec<String>,
    /// Ask for the issue to be planned before work starts
    #[arg(long, action = ArgAction::SetTrue)]
    planning: bool,
    /// Collector URL (default: FBC_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,
    /// Page URL reported in metadata (default: FBC_PAGE_URL)
    #[arg(long)]
    page_url: Option<String>,
    /// Write the final annotated screenshot here
    #[arg(long)]
    save_screenshot: Option<PathBuf>,
    /// Print the submission instead of sending it
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Run even when FBC_FEEDBACK_ENABLED is off
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Submission JSON file path (or - for stdin)
    submission: String,
    /// Where the screenshot was uploaded, if anywhere
    #[arg(long)]
    screenshot_url: Option<String>,
    /// Print the issue draft as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Capture(args) => command_capture(args),
        Commands::Select(args) => command_select(args),
        Commands::Annotate(args) => command_annotate(args),
        Commands::Feedback(args) => command_feedback(args),
        Commands::Report(args) => command_report(args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "capture",
            "description": "Capture the screen and emit a metadata JSON sidecar."
        }),
        json!({
            "name": "select",
            "description": "Drag-select a region of a screenshot and write the crop."
        }),
        json!({
            "name": "annotate",
            "description": "Replay marker/arrow/text editor scripts with undo/redo."
        }),
        json!({
            "name": "feedback",
            "description": "Capture, annotate and submit feedback with diagnostics."
        }),
        json!({
            "name": "report",
            "description": "Render the issue draft for a feedback submission."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn save_png(image: &image::RgbaImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    DynamicImage::ImageRgba8(image.clone())
        .save(path)
        .with_context(|| format!("failed to save output image: {}", path.display()))
}

fn open_rgba(path: &Path) -> Result<image::RgbaImage> {
    if !path.exists() {
        bail!("input not found: {}", path.display());
    }
    Ok(image::open(path)
        .with_context(|| format!("failed to open input image: {}", path.display()))?
        .to_rgba8())
}

fn parse_point_arg(raw: &str, flag: &str) -> Result<PointerInput> {
    let point = parse_point(raw).with_context(|| format!("{flag} expects x,y (got {raw:?})"))?;
    Ok(PointerInput::mouse(point.x, point.y))
}

fn command_capture(args: CaptureArgs) -> Result<()> {
    let config = Config::from_env();
    let capturer = SystemCapturer::new(&config.out_dir);
    let options = CaptureOptions::new(config.device_pixel_ratio, config.viewport);
    let out = args.out.clone().unwrap_or_else(|| capturer.next_path());

    let tool = capturer.capture_to(&out)?;
    let raw = open_rgba(&out)?;
    let image = normalize_capture(raw, &options)?;
    save_png(&image, &out)?;
    info!(tool, path = %out.display(), "screen captured");

    let sidecar_path = if args.no_sidecar {
        None
    } else {
        Some(args.sidecar.unwrap_or_else(|| default_sidecar_for(&out)))
    };
    let payload = capture_metadata(&out, &image, &options, sidecar_path.as_deref());
    if let Some(sidecar) = &sidecar_path {
        write_json_pretty(sidecar, &payload)?;
    }

    if args.json {
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        println!("{}", abs_path(&out).display());
    }
    Ok(())
}

fn command_select(args: SelectArgs) -> Result<()> {
    if args.dpr <= 0.0 {
        bail!("--dpr must be positive");
    }
    let screenshot = open_rgba(&args.input)?;
    let mut selector = RegionSelector::new(screenshot, args.dpr);

    selector.handle(RegionEvent::PointerDown(parse_point_arg(&args.from, "--from")?));
    selector.handle(RegionEvent::PointerMove(parse_point_arg(&args.to, "--to")?));
    if let Some(preview) = &args.preview_out {
        save_png(&selector.overlay(), preview)?;
    }

    let (region, crop) = match selector.handle(RegionEvent::PointerUp) {
        Some(RegionOutcome::Selected { region, image }) => (region, image),
        _ => bail!(
            "selection is smaller than {MIN_REGION_SIZE}x{MIN_REGION_SIZE} px; nothing selected"
        ),
    };
    save_png(&crop, &args.output)?;

    if args.json {
        let payload = json!({
            "input_path": abs_path(&args.input).display().to_string(),
            "output_path": abs_path(&args.output).display().to_string(),
            "region": region,
            "device_pixel_ratio": args.dpr,
            "size": {"width": crop.width(), "height": crop.height(), "units": "px"},
        });
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        println!("{}", abs_path(&args.output).display());
    }
    Ok(())
}

fn print_script_help() {
    println!("{}", SCRIPT_HELP.trim());
    println!();
    println!("Keyboard shortcuts:");
    for (keys, action) in SHORTCUTS {
        println!("  {keys:<14} {action}");
    }
}

fn command_annotate(args: AnnotateArgs) -> Result<()> {
    if args.script_help {
        print_script_help();
        return Ok(());
    }
    let (Some(input), Some(output), Some(script)) = (&args.input, &args.output, &args.script)
    else {
        bail!("annotate needs <input> <output> --script <file|->");
    };

    let base = open_rgba(input)?;
    let (img_w, img_h) = base.dimensions();
    let commands = parse_script(&read_input(script)?)
        .with_context(|| format!("invalid editor script: {script}"))?;

    let mut editor = AnnotationEditor::new(base);
    for command in &commands {
        editor.apply(command);
    }
    if editor.text_entry().is_some() {
        warn!("label still being typed at end of script; discarded");
        editor.cancel_text();
    }
    debug!(
        events = commands.len(),
        annotations = editor.annotations().len(),
        "script replayed"
    );
    save_png(&editor.render(), output)?;

    if !args.no_meta {
        let meta_path = args
            .meta_out
            .clone()
            .unwrap_or_else(|| default_sidecar_for(output));
        let payload = json!({
            "annotation_meta_version": 1,
            "input_path": abs_path(input).display().to_string(),
            "output_path": abs_path(output).display().to_string(),
            "meta_path": abs_path(&meta_path).display().to_string(),
            "generated_at": timestamp_iso(),
            "size": {"width": img_w, "height": img_h, "units": "px"},
            "events": commands.len(),
            "can_undo": editor.can_undo(),
            "can_redo": editor.can_redo(),
            "annotations": editor.annotations(),
        });
        write_json_pretty(&meta_path, &payload)?;
    }

    println!("{}", abs_path(output).display());
    Ok(())
}

fn build_form(args: &FeedbackArgs) -> Result<FeedbackForm> {
    let category = FeedbackCategory::parse(&args.category)
        .with_context(|| format!("unknown category: {}", args.category))?;
    let mut form = FeedbackForm::new(category, &args.title, &args.description);

    if let Some(raw) = &args.priority {
        form.priority =
            FeedbackPriority::parse(raw).with_context(|| format!("unknown priority: {raw}"))?;
    }
    for raw in &args.labels {
        let label = FeedbackLabel::parse(raw).with_context(|| format!("unknown label: {raw}"))?;
        if !form.labels.contains(&label) {
            form.toggle_label(label);
        }
    }
    form.requires_planning = args.planning;
    form.show_advanced = form.has_advanced_changes();
    Ok(form)
}

fn command_feedback(args: FeedbackArgs) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(page_url) = &args.page_url {
        config.page_url = page_url.clone();
    }
    if !config.feedback_enabled {
        if !args.force {
            bail!("feedback is disabled; set FBC_FEEDBACK_ENABLED=1 or pass --force");
        }
        config.feedback_enabled = true;
    }
    let form = build_form(&args)?;

    let capturer: Box<dyn ScreenCapturer> = match &args.screenshot {
        Some(path) => Box::new(ImageFileCapturer::new(path)),
        None => Box::new(SystemCapturer::new(&config.out_dir)),
    };
    let endpoint = config.endpoint.clone();
    let mut session = FeedbackSession::new(config, capturer);

    session.open();
    session.choose(args.mode.into());

    if session.phase() == Phase::Selecting {
        let (Some(from), Some(to)) = (&args.from, &args.to) else {
            bail!("region mode needs --from x,y and --to x,y");
        };
        session.region_event(RegionEvent::PointerDown(parse_point_arg(from, "--from")?));
        session.region_event(RegionEvent::PointerMove(parse_point_arg(to, "--to")?));
        session.region_event(RegionEvent::PointerUp);
        if session.phase() == Phase::Selecting {
            bail!(
                "selection is smaller than {MIN_REGION_SIZE}x{MIN_REGION_SIZE} px; nothing selected"
            );
        }
    }

    if let Some(script) = &args.script {
        if session.editor().is_none() {
            warn!("no screenshot to annotate; ignoring --script");
        } else {
            let commands = parse_script(&read_input(script)?)
                .with_context(|| format!("invalid editor script: {script}"))?;
            for command in &commands {
                session.editor_command(command);
            }
        }
    }

    if let Some(path) = &args.save_screenshot {
        match session.screenshot() {
            Some(data_url) => save_png(&decode_data_url(&data_url)?, path)?,
            None => warn!("no screenshot captured; {} not written", path.display()),
        }
    }

    if args.dry_run {
        let submission = match session.begin_submit(&form) {
            Ok(submission) => submission,
            Err(outcome) => return report_outcome(outcome, &mut session.take_notices()),
        };
        println!("{}", serde_json::to_string_pretty(&submission)?);
        return Ok(());
    }

    let client = FeedbackClient::new(&endpoint);
    let outcome = session.submit(&form, &client);
    report_outcome(outcome, &mut session.take_notices())
}

fn report_outcome(outcome: SubmitOutcome, notices: &mut Vec<Notice>) -> Result<()> {
    for notice in notices.drain(..) {
        match notice {
            Notice::Success { message, issue_url } => match issue_url {
                Some(url) => eprintln!("{message} View issue → {url}"),
                None => eprintln!("{message}"),
            },
            Notice::Error { message } => eprintln!("{message}"),
        }
    }

    match outcome {
        SubmitOutcome::Sent(response) => {
            println!(
                "{}",
                serde_json::to_string(&json!({
                    "success": response.success,
                    "issueUrl": response.issue_url,
                    "warning": response.warning,
                    "failedRequests": diagnostics::get_diagnostics().network_errors.len(),
                }))?
            );
            Ok(())
        }
        SubmitOutcome::Invalid(errors) => {
            let fields: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {e}", e.field()))
                .collect();
            bail!("feedback form is incomplete ({})", fields.join("; "))
        }
        SubmitOutcome::Failed(message) => bail!("{message}"),
        SubmitOutcome::Busy => bail!("a submission is already in flight"),
        SubmitOutcome::NotOpen => bail!("feedback form is not open"),
    }
}

fn command_report(args: ReportArgs) -> Result<()> {
    let raw = read_input(&args.submission)?;
    let submission: FeedbackSubmission = serde_json::from_str(&raw)
        .with_context(|| format!("invalid submission JSON: {}", args.submission))?;
    let draft = issue_draft(&submission, args.screenshot_url.as_deref());

    if args.json {
        let value: Value = serde_json::to_value(&draft)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", draft.title);
    println!("priority: {}", draft.priority);
    println!("labels: {}", draft.labels.join(", "));
    if draft.requires_planning {
        println!("state: requires planning");
    }
    println!();
    println!("{}", draft.body);
    Ok(())
}
