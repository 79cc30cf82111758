// Credentials can be compiled in from the environment: rebuild whenever
// one of the variables changes, and refuse ports that don't parse.
#[path = "src/port.rs"]
mod port;

fn main() {
    for var in [
        "THING_DEVICE_NAME",
        "THING_WIFI_SSID",
        "THING_WIFI_PASSWORD",
        "THING_BROKER_ENDPOINT",
        "THING_BROKER_PORT",
        "THING_CA_CERT",
        "THING_DEVICE_CERT",
        "THING_PRIVATE_KEY",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }
    if let Ok(value) = std::env::var("THING_BROKER_PORT") {
        if port::parse(&value).is_none() {
            panic!("THING_BROKER_PORT={value:?} is not a port between 1 and 65535");
        }
    }
}
