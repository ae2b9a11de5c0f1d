// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Print incoming messages from a listener while the main task keeps busy
//! posting a numbered message to each joined room in turn, every 5 seconds.

use std::env::args;
use std::time::Duration;

use simple_xmpp::transport::xmpp;
use simple_xmpp::{ClientBuilder, IncomingMessage};

#[tokio::main]
async fn main() -> Result<(), Option<()>> {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() < 4 {
        println!("Usage: {} <jid> <password> <ROOM> [ROOM...]", args[0]);
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

    client.register_listener(|message: IncomingMessage| {
        println!("{} {}", message.from, message.body);
    });

    let rooms: Vec<String> = client.joined_rooms().map(|r| r.to_string()).collect();
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let mut i = 0u64;
    'busy: loop {
        for room in &rooms {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => break 'busy,
            }
            if let Err(e) = client.send_to_room(room, &format!("Message {i}")).await {
                log::error!("Could not post to {}: {}", room, e);
                break 'busy;
            }
            i += 1;
        }
    }

    client.disconnect().await;
    Ok(())
}
