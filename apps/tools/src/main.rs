use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use shared::{
    domain::{Location, ParticipantName},
    error::ApiError,
    protocol::{
        AcceptMenu, AcceptRequestBody, JoinRequest, MoveRequest, ParticipantList, SendMenu,
        SendRequestBody,
    },
};

#[derive(Parser, Debug)]
#[command(name = "tpa", about = "Drive a teleport request server from the command line")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    server: String,
    /// Participant the command acts as.
    #[arg(long, short)]
    name: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Position {
    #[arg(long, default_value = "overworld")]
    dimension: String,
    #[arg(allow_negative_numbers = true)]
    x: f64,
    #[arg(allow_negative_numbers = true)]
    y: f64,
    #[arg(allow_negative_numbers = true)]
    z: f64,
}

impl From<Position> for Location {
    fn from(value: Position) -> Self {
        Location::new(value.dimension, value.x, value.y, value.z)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    Join(Position),
    Leave,
    Move(Position),
    Participants,
    /// Lists who a request can be sent to.
    Targets,
    Send {
        target: String,
    },
    /// Lists pending requests, numbered for `accept`.
    Pending,
    Accept {
        index: usize,
    },
}

struct TpaClient {
    http: Client,
    base: String,
}

impl TpaClient {
    fn new(base: &str) -> Self {
        Self {
            http: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.context("server unreachable")?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        match response.json::<ApiError>().await {
            Ok(error) => bail!("{} ({status})", error.message),
            Err(_) => bail!("request failed with {status}"),
        }
    }

    async fn accept_menu(&self, name: &str) -> Result<AcceptMenu> {
        let request = self
            .http
            .get(self.url("/tpa/requests"))
            .query(&[("name", name)]);
        Ok(self.execute(request).await?.json().await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = TpaClient::new(&cli.server);
    let me = ParticipantName::from(cli.name.as_str());

    match cli.command {
        Command::Join(position) => {
            let body = JoinRequest {
                name: me.clone(),
                location: position.into(),
            };
            client
                .execute(client.http.post(client.url("/participants")).json(&body))
                .await?;
            println!("joined as {me}");
        }
        Command::Leave => {
            client
                .execute(client.http.delete(client.url(&format!("/participants/{me}"))))
                .await?;
            println!("{me} left");
        }
        Command::Move(position) => {
            let body = MoveRequest {
                location: position.into(),
            };
            client
                .execute(
                    client
                        .http
                        .put(client.url(&format!("/participants/{me}/location")))
                        .json(&body),
                )
                .await?;
        }
        Command::Participants => {
            let list: ParticipantList = client
                .execute(client.http.get(client.url("/participants")))
                .await?
                .json()
                .await?;
            for name in list.participants {
                println!("{name}");
            }
        }
        Command::Targets => {
            let menu: SendMenu = client
                .execute(
                    client
                        .http
                        .get(client.url("/tpa/send_menu"))
                        .query(&[("name", me.as_str())]),
                )
                .await?
                .json()
                .await?;
            for candidate in menu.candidates {
                println!("{candidate}");
            }
        }
        Command::Send { target } => {
            let body = SendRequestBody {
                sender: me.clone(),
                target: ParticipantName::from(target),
            };
            client
                .execute(client.http.post(client.url("/tpa/requests")).json(&body))
                .await?;
            println!("teleport request sent to {}", body.target);
        }
        Command::Pending => {
            let menu = client.accept_menu(me.as_str()).await?;
            for (index, requester) in menu.requesters.iter().enumerate() {
                println!("[{index}] {requester}");
            }
        }
        Command::Accept { index } => {
            let menu = client.accept_menu(me.as_str()).await?;
            let requester = menu.resolve(index)?.clone();
            let body = AcceptRequestBody {
                target: me.clone(),
                requester,
            };
            client
                .execute(
                    client
                        .http
                        .post(client.url("/tpa/requests/accept"))
                        .json(&body),
                )
                .await?;
            println!("accepted teleport request from {}", body.requester);
        }
    }

    Ok(())
}
