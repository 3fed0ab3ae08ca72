// Viewer input loop: reads lines, parses them against the last rendered
// view, and forwards commands to the app loop.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use ballot_app::protocol::UserCommand;

use crate::command::{parse_user_line, Input, USER_HELP};
use crate::console::ViewContext;

/// Read commands from `input` until `quit`, end of input, or the app loop
/// going away. Parse errors and help text are written to `out`.
pub async fn read_user_commands<R, W>(
    input: R,
    mut out: W,
    cmd_tx: mpsc::Sender<UserCommand>,
    context: watch::Receiver<ViewContext>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let parsed = {
            let ctx = context.borrow();
            parse_user_line(&line, &ctx)
        };
        let cmd = match parsed {
            Ok(Some(Input::Command(cmd))) => cmd,
            Ok(Some(Input::Help)) => {
                out.write_all(USER_HELP.as_bytes())?;
                continue;
            }
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "? {e}")?;
                continue;
            }
        };

        let quit = cmd == UserCommand::Quit;
        if cmd_tx.send(cmd).await.is_err() {
            debug!("App loop gone, stopping input");
            return Ok(());
        }
        if quit {
            return Ok(());
        }
    }

    info!("Input closed, quitting");
    let _ = cmd_tx.send(UserCommand::Quit).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_core::model::ALL_CATEGORIES;

    fn context(category: &str) -> watch::Receiver<ViewContext> {
        let (tx, rx) = watch::channel(ViewContext {
            category: category.to_string(),
            categories: vec!["Sound".into()],
        });
        // Receivers keep the last value after the sender is dropped.
        drop(tx);
        rx
    }

    async fn drain(mut rx: mpsc::Receiver<UserCommand>) -> Vec<UserCommand> {
        let mut out = Vec::new();
        while let Some(cmd) = rx.recv().await {
            out.push(cmd);
        }
        out
    }

    #[tokio::test]
    async fn forwards_commands_until_quit() {
        let (tx, rx) = mpsc::channel(16);
        let mut out = Vec::new();
        let script = b"seen f1\n\npick f2\nquit\nrefresh\n";

        read_user_commands(&script[..], &mut out, tx, context("Sound"))
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![
                UserCommand::ToggleSeen {
                    film_id: "f1".into()
                },
                UserCommand::TogglePick {
                    category: "Sound".into(),
                    film_id: "f2".into()
                },
                UserCommand::Quit,
            ]
        );
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn end_of_input_quits() {
        let (tx, rx) = mpsc::channel(16);
        read_user_commands(&b"show"[..], Vec::new(), tx, context("Sound"))
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![UserCommand::SetVisible(true), UserCommand::Quit]
        );
    }

    #[tokio::test]
    async fn errors_and_help_go_to_output() {
        let (tx, rx) = mpsc::channel(16);
        let mut out = Vec::new();

        read_user_commands(&b"pick f1\nhelp\n"[..], &mut out, tx, context(ALL_CATEGORIES))
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("? choose a category first"));
        assert!(text.contains("toggle My Pick"));
        assert_eq!(drain(rx).await, vec![UserCommand::Quit]);
    }
}
