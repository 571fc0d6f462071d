//! Command handlers over a live session.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use sessionkit_core::api::{Method, RequestOptions};
use sessionkit_core::models::{
    ChangePasswordRequest, LoginRequest, PasswordResetConfirmRequest, ProfileUpdate,
    RegisterRequest, UserIdentity,
};
use sessionkit_core::session::{RouteDecision, RouteRule, SessionHandle, SessionManager};
use tracing::debug;

use crate::cli::{Cli, Command, ResetCommand};

pub async fn run(cli: Cli, manager: SessionManager) -> Result<()> {
    let snapshot = manager.initialize().await;
    debug!(status = snapshot.status().label(), "Session initialized");

    let handle = SessionHandle::new(manager.clone());
    let json = cli.json;

    match cli.command {
        Command::Status => print_status(&handle, json)?,

        Command::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => rpassword::prompt_password("Password: ")?,
            };
            let user = handle
                .login(&LoginRequest::new(email, password))
                .await
                .context("Login failed")?;
            print_user(&user, json, "Signed in as")?;
        }

        Command::Register {
            email,
            first_name,
            last_name,
        } => {
            let password = prompt_new_password()?;
            let request = RegisterRequest {
                email,
                password,
                first_name,
                last_name,
            };
            let user = handle.register(&request).await.context("Registration failed")?;
            print_user(&user, json, "Registered and signed in as")?;
        }

        Command::Logout { all } => {
            if all {
                handle.logout_all().await;
                println!("Signed out of every device");
            } else {
                handle.logout().await;
                println!("Signed out");
            }
        }

        Command::Whoami => {
            require_session(&handle)?;
            let user = handle.refresh_user().await?;
            print_user(&user, json, "Signed in as")?;
        }

        Command::Refresh => {
            require_session(&handle)?;
            if !handle.refresh_tokens().await {
                bail!("Could not refresh the access token");
            }
            match manager.tokens().expires_at() {
                Some(expiry) => println!("Access token renewed, valid until {}", expiry.to_rfc3339()),
                None => println!("Access token renewed"),
            }
        }

        Command::Profile {
            first_name,
            last_name,
            name,
            avatar_url,
        } => {
            require_session(&handle)?;
            let update = ProfileUpdate {
                first_name,
                last_name,
                name,
                avatar_url,
            };
            let user = if update.is_empty() {
                handle.user().ok_or_else(|| anyhow!("Not signed in"))?
            } else {
                handle.update_profile(&update).await?
            };
            print_user(&user, json, "Profile of")?;
        }

        Command::ChangePassword => {
            require_session(&handle)?;
            let current_password = rpassword::prompt_password("Current password: ")?;
            let new_password = prompt_new_password()?;
            let response = handle
                .change_password(&ChangePasswordRequest {
                    current_password,
                    new_password,
                })
                .await?;
            print_message(&response.message, "Password changed");
        }

        Command::ResetPassword { command } => match command {
            ResetCommand::Request { email } => {
                let response = handle.request_password_reset(&email).await?;
                print_message(&response.message, "Check your inbox for a reset link");
            }
            ResetCommand::Confirm { token } => {
                let new_password = prompt_new_password()?;
                let response = handle
                    .reset_password(&PasswordResetConfirmRequest {
                        token,
                        new_password,
                    })
                    .await?;
                print_message(&response.message, "Password reset");
            }
        },

        Command::VerifyEmail { token, resend } => {
            if resend {
                let response = handle.resend_verification_email().await?;
                print_message(&response.message, "Verification email sent");
            } else {
                let token = token.ok_or_else(|| anyhow!("A verification token is required"))?;
                let response = handle.verify_email(&token).await?;
                print_message(&response.message, "Email verified");
            }
        }

        Command::Request {
            method,
            path,
            data,
            no_auth,
        } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let body: Option<Value> = data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("--data must be valid JSON")?;
            let options = if no_auth {
                RequestOptions::new().skip_auth()
            } else {
                RequestOptions::new()
            };

            let response: Value = manager
                .api()
                .request(method, &path, body.as_ref(), options)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Route { path, auth, roles } => {
            let rule = RouteRule {
                auth: auth.into(),
                roles,
            };
            match handle.resolve_route(&rule, &path).await {
                RouteDecision::Allow => println!("allow"),
                RouteDecision::Redirect(to) => println!("redirect {}", to),
                RouteDecision::Pending => println!("pending"),
            }
        }
    }

    manager.shutdown();
    Ok(())
}

fn require_session(handle: &SessionHandle) -> Result<()> {
    if !handle.is_authenticated() {
        bail!("Not signed in. Run `sessionkit login` first");
    }
    Ok(())
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

fn print_status(handle: &SessionHandle, json: bool) -> Result<()> {
    let summary = handle.snapshot().summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Status: {}", summary.status.label());
    if let Some(ref user) = summary.user {
        println!("User:   {} <{}>", user.display_name(), user.email);
        if let Some(ref role) = user.role {
            println!("Role:   {}", role);
        }
    }
    if let Some(ref error) = summary.error {
        println!("Error:  {}", error);
    }
    Ok(())
}

fn print_user(user: &UserIdentity, json: bool, heading: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(user)?);
    } else {
        println!("{} {} <{}>", heading, user.display_name(), user.email);
    }
    Ok(())
}

fn print_message(message: &str, fallback: &str) {
    if message.is_empty() {
        println!("{}", fallback);
    } else {
        println!("{}", message);
    }
}
