// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Log in, join the chatrooms given on the command line and print every
//! message received, until interrupted.

use std::env::args;

use simple_xmpp::transport::xmpp;
use simple_xmpp::ClientBuilder;

#[tokio::main]
async fn main() -> Result<(), Option<()>> {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() < 3 {
        println!("Usage: {} <jid> <password> [ROOM...]", args[0]);
        return Err(None);
    }

    let mut client = match ClientBuilder::new(&args[1], &args[2])
        .join_rooms(&args[3..])
        .connect(xmpp::starttls())
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("Could not connect as {}: {}", args[1], e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Connected as {}, in {} room(s).",
        client.identity(),
        client.joined_rooms().count()
    );

    loop {
        tokio::select! {
            message = client.next_message() => match message {
                Ok(message) => match message.room {
                    Some(room) => println!("[{}] {}: {}", room, message.from, message.body),
                    None => println!("{}: {}", message.from, message.body),
                },
                Err(e) => {
                    log::error!("Session ended: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await;
    Ok(())
}
