//! Commands a guided takeoff through a running mavgate bridge and waits for
//! the vehicle's acknowledgement.
//!
//! Run the bridge first, then: `cargo run --example takeoff`

use mavgate::grpc::proto::mavlink_bridge_client::MavlinkBridgeClient;
use mavgate::grpc::proto::mavlink_message::Payload;
use mavgate::grpc::proto::{CommandLong, MavlinkMessage, StreamFilter};

/// MAV_CMD_NAV_TAKEOFF
const TAKEOFF_COMMAND: u32 = 22;
/// COMMAND_ACK message id.
const COMMAND_ACK_ID: u32 = 77;

const TAKEOFF_ALTITUDE_M: f32 = 10.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = MavlinkBridgeClient::connect("http://127.0.0.1:50051").await?;

    // Subscribe to acknowledgements before sending the command.
    let mut acks = client
        .stream_messages(StreamFilter {
            message_ids: vec![COMMAND_ACK_ID],
            ..Default::default()
        })
        .await?
        .into_inner();

    let takeoff = MavlinkMessage {
        system_id: 254,
        component_id: 190,
        message_id: 76,
        sequence: 0,
        payload: Some(Payload::CommandLong(CommandLong {
            target_system: 1,
            target_component: 1,
            command: TAKEOFF_COMMAND,
            confirmation: 0,
            param7: TAKEOFF_ALTITUDE_M,
            ..Default::default()
        })),
    };

    let response = client.send_message(takeoff).await?.into_inner();
    println!("takeoff command sent: success={}", response.success);

    if let Some(ack) = acks.message().await? {
        if let Some(Payload::CommandAck(ack)) = ack.payload {
            println!("command {} acknowledged with result {}", ack.command, ack.result);
        }
    }

    Ok(())
}
