use std::io::Write;

use clap::Args;

use dash_core::session::Session;

use crate::Context;

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Access token issued by the server.
    #[arg(long, env = "DASH_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(long)]
    pub username: Option<String>,
}

pub fn login(ctx: &Context, args: &LoginArgs, stdout: &mut dyn Write) -> Result<(), String> {
    let token = args.token.trim();
    if token.is_empty() {
        return Err("token must not be empty".to_string());
    }
    let mut session = Session::new(token);
    if let Some(username) = &args.username {
        session = session.with_username(username.clone());
    }
    ctx.session.save(session).map_err(|err| err.to_string())?;
    match &args.username {
        Some(username) => writeln!(stdout, "Logged in as {username}"),
        None => writeln!(stdout, "Logged in"),
    }
    .map_err(|err| err.to_string())
}

pub fn logout(ctx: &Context, stdout: &mut dyn Write) -> Result<(), String> {
    ctx.session.clear().map_err(|err| err.to_string())?;
    writeln!(stdout, "Logged out").map_err(|err| err.to_string())
}
