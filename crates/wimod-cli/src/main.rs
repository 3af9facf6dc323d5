//! `wimod` - talk to a WiMOD module through a serial-over-TCP bridge.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use wimod_cli::{
    init_logging, metrics_table, parse_hex_payload, parse_u8, CliConfig, CliResult, TcpBridge,
};
use wimod_hci::saps::{
    DeviceManagement, RadioLinkTest, RemoteControl, RemoteCtrlEvent, RltEvent, SensorApp, SensorEvent,
};
use wimod_hci::{CommandRequest, HciClient};

/// Host tool for WiMOD radio modules.
#[derive(Parser, Debug)]
#[command(name = "wimod", version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bridge address (host:port), overrides the configuration file
    #[arg(short, long)]
    address: Option<String>,

    /// Command timeout in milliseconds, overrides the configuration file
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the module answers
    Ping,
    /// Print device and firmware information
    Info,
    /// Print runtime counters
    Status,
    /// Restart the module
    Reset,
    /// Send a raw command and print the response
    Send {
        /// SAP id (decimal or 0x hex)
        sap: String,
        /// Request message id (decimal or 0x hex)
        msg: String,
        /// Payload as hex
        #[arg(default_value = "")]
        payload: String,
        /// Expected response message id (default: request + 1)
        #[arg(long)]
        response: Option<String>,
    },
    /// Print indications until interrupted
    Monitor,
    /// List the metrics the core emits
    Metrics,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    wimod_metrics::describe_metrics();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> CliResult<()> {
    if let Command::Metrics = args.command {
        print!("{}", metrics_table());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(address) = args.address {
        config.connection.address = address;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.hci.default_timeout_ms = timeout_ms;
        config.hci.validate()?;
    }
    debug!(?config, "configuration");

    let bridge = TcpBridge::connect(&config.connection, config.hci.clone())?;
    let result = execute(args.command, bridge.client().clone());
    let stats = bridge.client().stats();
    debug!(?stats, "link statistics");
    bridge.shutdown();
    result
}

fn execute(command: Command, client: HciClient) -> CliResult<()> {
    match command {
        Command::Ping => {
            let devmgmt = DeviceManagement::attach(client, |_| {})?;
            devmgmt.ping()?;
            println!("pong");
        }
        Command::Info => {
            let devmgmt = DeviceManagement::attach(client, |_| {})?;
            let device = devmgmt.get_device_info()?;
            let firmware = devmgmt.get_firmware_info()?;
            println!("module type:    0x{:02X}", device.module_type);
            println!("device address: 0x{:04X}", device.device_address);
            println!("group address:  0x{:02X}", device.group_address);
            println!("device id:      0x{:08X}", device.device_id);
            println!("firmware:       {} {} ({})", firmware.firmware_name, firmware.version(), firmware.build_date);
        }
        Command::Status => {
            let devmgmt = DeviceManagement::attach(client, |_| {})?;
            let status = devmgmt.get_system_status()?;
            println!("{:#?}", status);
        }
        Command::Reset => {
            let devmgmt = DeviceManagement::attach(client, |_| {})?;
            devmgmt.reset()?;
            println!("reset requested");
        }
        Command::Send {
            sap,
            msg,
            payload,
            response,
        } => {
            let sap_id = parse_u8(&sap)?;
            let msg_id = parse_u8(&msg)?;
            let payload = parse_hex_payload(&payload)?;
            client.register(sap_id, |ind| {
                println!("indication sap=0x{:02X} msg=0x{:02X} {}", ind.sap_id, ind.msg_id, hex::encode(&ind.payload));
            })?;
            let mut request = CommandRequest::new(sap_id, msg_id, payload);
            if let Some(response) = response {
                request = request.expect_response(parse_u8(&response)?);
            }
            let rsp = client.begin_command(request)?.wait()?;
            println!(
                "response sap=0x{:02X} msg=0x{:02X} {}",
                rsp.sap_id,
                rsp.msg_id,
                hex::encode(&rsp.payload)
            );
        }
        Command::Monitor => monitor(client)?,
        Command::Metrics => print!("{}", metrics_table()),
    }
    Ok(())
}

fn monitor(client: HciClient) -> CliResult<()> {
    DeviceManagement::attach(client.clone(), |msg| {
        println!("devmgmt msg=0x{:02X} {}", msg.msg_id, hex::encode(&msg.payload));
    })?;
    RadioLinkTest::attach(client.clone(), |event| match event {
        RltEvent::Status(status) => println!("rlt {:?}", status),
        RltEvent::Other(msg) => println!("rlt msg=0x{:02X} {}", msg.msg_id, hex::encode(&msg.payload)),
    })?;
    RemoteControl::attach(client.clone(), |event| match event {
        RemoteCtrlEvent::ButtonPressed(press) => println!(
            "buttons {:?} from 0x{:02X}/0x{:04X}",
            press.buttons, press.source_group_address, press.source_device_address
        ),
        RemoteCtrlEvent::Other(msg) => println!("remote msg=0x{:02X} {}", msg.msg_id, hex::encode(&msg.payload)),
    })?;
    SensorApp::attach(client.clone(), |event| match event {
        SensorEvent::Data(data) => println!("sensor {:?}", data),
        SensorEvent::Ack(ack) => println!("sensor ack {:?}", ack),
        SensorEvent::Other(msg) => println!("sensor msg=0x{:02X} {}", msg.msg_id, hex::encode(&msg.payload)),
    })?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| wimod_cli::CliError::InvalidArgument(format!("cannot install signal handler: {}", e)))?;

    info!("monitoring, press Ctrl-C to stop");
    loop {
        if stop_rx.recv_timeout(Duration::from_millis(200)).is_ok() {
            break;
        }
        if client.is_closed() {
            info!("link closed");
            break;
        }
    }
    let stats = client.stats();
    println!(
        "frames={} indications={} checksum_errors={} framing_errors={} unknown_sap={}",
        stats.frames_received, stats.indications, stats.checksum_errors, stats.framing_errors, stats.unknown_sap
    );
    Ok(())
}
