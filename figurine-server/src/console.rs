// File: figurine-server/src/console.rs
//
// Line-oriented console: each typed line becomes an Event for the controller
// or a query against it.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;

use figurine_common::models::{Event, HandGesture, IdleBehavior};
use figurine_core::MotionController;

const HELP: &str = "\
Commands:
  aim <deg>              point the camera at an absolute heading
  clear                  drop the manual heading
  person <offset> [yaw]  fake a detection, offset in [-1, 1]
  lost                   fake a lost person
  left up|down           force the wave hand
  right up|down          force the pointing hand
  point                  start the pointing gesture
  attention              attention part done (raise fully)
  lecture                lecture done (lower)
  suppress | allow       suppress or allow waving
  idle none|sweep|patrol|minimal
  reset                  back to the idle baseline
  pose | status
  help | quit
";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Send(Event),
    Pose,
    Status,
    Help,
    Quit,
}

pub fn parse_idle(name: &str) -> Option<IdleBehavior> {
    match name.to_lowercase().as_str() {
        "none" | "off" => Some(IdleBehavior::None),
        "sweep" => Some(IdleBehavior::Sweep(Default::default())),
        "patrol" => Some(IdleBehavior::Patrol(Default::default())),
        "minimal" | "minimal_idle" => Some(IdleBehavior::MinimalIdle(Default::default())),
        _ => None,
    }
}

fn number(arg: Option<&&str>, what: &str) -> Result<f64, String> {
    let raw = arg.ok_or_else(|| format!("missing {}", what))?;
    let value: f64 = raw.parse().map_err(|_| format!("'{}' is not a number", raw))?;
    if !value.is_finite() {
        return Err(format!("{} must be finite", what));
    }
    Ok(value)
}

fn gesture(arg: Option<&&str>) -> Result<HandGesture, String> {
    arg.ok_or_else(|| "expected up|down".to_string())?
        .parse::<HandGesture>()
        .map_err(|_| "expected up|down".to_string())
}

/// Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return Ok(None);
    };
    let cmd = first.to_lowercase();
    let args = &parts[1..];

    let parsed = match cmd.as_str() {
        "aim" => ConsoleCommand::Send(Event::AimCamera { heading: number(args.first(), "heading")? }),
        "clear" => ConsoleCommand::Send(Event::ClearTarget),
        "person" => {
            let offset = number(args.first(), "offset")?;
            let face_yaw = match args.get(1) {
                Some(_) => Some(number(args.get(1), "yaw")?),
                None => None,
            };
            ConsoleCommand::Send(Event::PersonDetected { offset, face_yaw })
        }
        "lost" => ConsoleCommand::Send(Event::PersonLost),
        "left" => ConsoleCommand::Send(Event::SetLeftHandGesture { gesture: gesture(args.first())? }),
        "right" => ConsoleCommand::Send(Event::SetRightHandGesture { gesture: gesture(args.first())? }),
        "point" => ConsoleCommand::Send(Event::StartPointingGesture),
        "attention" => ConsoleCommand::Send(Event::PointingAttentionDone),
        "lecture" => ConsoleCommand::Send(Event::PointingLectureDone),
        "suppress" => ConsoleCommand::Send(Event::SuppressWaving),
        "allow" => ConsoleCommand::Send(Event::AllowWaving),
        "idle" => {
            let name = args.first().ok_or("usage: idle none|sweep|patrol|minimal")?;
            let behavior = parse_idle(name).ok_or_else(|| format!("unknown idle behaviour '{}'", name))?;
            ConsoleCommand::Send(Event::SetIdleBehavior { behavior })
        }
        "reset" => ConsoleCommand::Send(Event::Idle),
        "pose" => ConsoleCommand::Pose,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(parsed))
}

/// Returns (quit, output).
pub async fn dispatch(line: &str, controller: &MotionController) -> (bool, Option<String>) {
    let command = match parse(line) {
        Ok(Some(c)) => c,
        Ok(None) => return (false, None),
        Err(msg) => return (false, Some(msg)),
    };

    match command {
        ConsoleCommand::Send(event) => {
            let kind = event.event_type();
            match controller.send(event) {
                Ok(()) => (false, Some(format!("queued {}", kind))),
                Err(e) => (false, Some(format!("error: {}", e))),
            }
        }
        ConsoleCommand::Pose => match controller.current_pose().await {
            Ok(p) => (
                false,
                Some(format!(
                    "body={:.1} head={:.1} camera={:.1} left={:.1} right={:.1}",
                    p.body,
                    p.head,
                    p.camera_heading(),
                    p.left_hand,
                    p.right_hand
                )),
            ),
            Err(e) => (false, Some(format!("error: {}", e))),
        },
        ConsoleCommand::Status => match controller.status().await {
            Ok(s) => (
                false,
                Some(serde_json::to_string_pretty(&s).unwrap_or_else(|e| format!("error: {}", e))),
            ),
            Err(e) => (false, Some(format!("error: {}", e))),
        },
        ConsoleCommand::Help => (false, Some(HELP.to_string())),
        ConsoleCommand::Quit => (true, None),
    }
}

/// Reads stdin until `quit`, end of input, or shutdown.
pub async fn run_console(controller: MotionController, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("figurine console; type 'help' for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("console: end of input");
                    break;
                };
                let (quit, output) = dispatch(&line, &controller).await;
                if let Some(out) = output {
                    println!("{}", out);
                }
                if quit {
                    break;
                }
            },
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            },
        }
    }
    Ok(())
}
