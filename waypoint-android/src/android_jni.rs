use crate::bridge::Bridge;
use crate::error::{throw_java_exception, BridgeError, BridgeResult};
use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jdouble, jint, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use waypoint_agent::Fix;

// Global bridge - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_BRIDGE: Mutex<Option<Arc<Bridge>>> = Mutex::new(None);
}

fn get_bridge() -> BridgeResult<Arc<Bridge>> {
    let guard = GLOBAL_BRIDGE
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global bridge lock".to_string()))?;
    guard.as_ref().map(Arc::clone).ok_or(BridgeError::NotInitialized)
}

fn init_logging() {
    #[cfg(target_os = "android")]
    {
        let _ = android_log::init("Waypoint");
    }
}

/// 0 on success, -1 after throwing the matching Java exception
fn status_code(env: &mut JNIEnv, result: BridgeResult<()>) -> jint {
    match result {
        Ok(()) => 0,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            -1
        }
    }
}

/// Java string, or null after throwing
fn string_result(env: &mut JNIEnv, result: BridgeResult<String>) -> jstring {
    let result = result.and_then(|s| env.new_string(s).map_err(BridgeError::from));
    match result {
        Ok(jstr) => jstr.into_raw(),
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            std::ptr::null_mut()
        }
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> BridgeResult<String> {
    Ok(env.get_string(value)?.into())
}

/// `Int.MIN_VALUE` on the Java side; negative floors are real basement levels
const UNKNOWN_FLOOR: jint = jint::MIN;

#[allow(clippy::too_many_arguments)]
fn make_fix(
    timestamp: jdouble,
    latitude: jdouble,
    longitude: jdouble,
    horizontal_accuracy: jdouble,
    altitude: jdouble,
    vertical_accuracy: jdouble,
    floor: jint,
    heading: jdouble,
    heading_accuracy: jdouble,
    speed: jdouble,
    speed_accuracy: jdouble,
) -> Fix {
    Fix {
        altitude,
        vertical_accuracy,
        floor: (floor != UNKNOWN_FLOOR).then_some(floor),
        heading,
        heading_accuracy,
        speed,
        speed_accuracy,
        ..Fix::new(timestamp, latitude, longitude, horizontal_accuracy)
    }
}

/// JNI: Open the agent state in `dataDir` and resume tracking if enabled
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_init(
    mut env: JNIEnv,
    _class: JClass,
    data_dir: JString,
) -> jint {
    let result = read_string(&mut env, &data_dir).and_then(|dir| init_impl(PathBuf::from(dir)));
    status_code(&mut env, result)
}

fn init_impl(data_dir: PathBuf) -> BridgeResult<()> {
    init_logging();
    let mut guard = GLOBAL_BRIDGE
        .lock()
        .map_err(|_| BridgeError::Internal("Failed to acquire global bridge lock".to_string()))?;
    if guard.is_some() {
        return Err(BridgeError::AlreadyInitialized);
    }
    *guard = Some(Arc::new(Bridge::open(&data_dir)?));
    Ok(())
}

/// JNI: Passive / significant-change fix
/// Parameters: timestamp (epoch s), latitude, longitude, horizontal accuracy (m),
/// altitude (m), vertical accuracy (m), floor (`Int.MIN_VALUE` = unknown), heading (deg),
/// heading accuracy (deg), speed (m/s), speed accuracy (m/s); negative = unknown
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_pushPassiveFix(
    mut env: JNIEnv,
    _class: JClass,
    timestamp: jdouble,
    latitude: jdouble,
    longitude: jdouble,
    horizontal_accuracy: jdouble,
    altitude: jdouble,
    vertical_accuracy: jdouble,
    floor: jint,
    heading: jdouble,
    heading_accuracy: jdouble,
    speed: jdouble,
    speed_accuracy: jdouble,
) -> jint {
    let fix = make_fix(
        timestamp,
        latitude,
        longitude,
        horizontal_accuracy,
        altitude,
        vertical_accuracy,
        floor,
        heading,
        heading_accuracy,
        speed,
        speed_accuracy,
    );
    let result = get_bridge().map(|bridge| bridge.push_passive_fix(fix));
    status_code(&mut env, result)
}

/// JNI: Fix from the high-frequency subscription
/// Returns: 1 if the live loop took it, 0 if it was handled as passive, -1 on error
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_pushLiveFix(
    mut env: JNIEnv,
    _class: JClass,
    timestamp: jdouble,
    latitude: jdouble,
    longitude: jdouble,
    horizontal_accuracy: jdouble,
    altitude: jdouble,
    vertical_accuracy: jdouble,
    floor: jint,
    heading: jdouble,
    heading_accuracy: jdouble,
    speed: jdouble,
    speed_accuracy: jdouble,
) -> jint {
    let fix = make_fix(
        timestamp,
        latitude,
        longitude,
        horizontal_accuracy,
        altitude,
        vertical_accuracy,
        floor,
        heading,
        heading_accuracy,
        speed,
        speed_accuracy,
    );
    match get_bridge() {
        Ok(bridge) => bridge.push_live_fix(fix) as jint,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Place visit. Pass a negative departure while still at the place.
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_pushVisit(
    mut env: JNIEnv,
    _class: JClass,
    latitude: jdouble,
    longitude: jdouble,
    arrival: jdouble,
    departure: jdouble,
) -> jint {
    let result = get_bridge().map(|bridge| bridge.push_visit(latitude, longitude, arrival, departure));
    status_code(&mut env, result)
}

/// JNI: Location subsystem failure while live updates are running
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_reportLocationError(
    mut env: JNIEnv,
    _class: JClass,
    message: JString,
) -> jint {
    let result = read_string(&mut env, &message)
        .and_then(|msg| get_bridge().map(|bridge| bridge.report_location_error(&msg)));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setNetworkReachable(
    mut env: JNIEnv,
    _class: JClass,
    reachable: jboolean,
) -> jint {
    let result = get_bridge().map(|bridge| bridge.set_network_reachable(reachable == JNI_TRUE));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_forceFlush(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_bridge().map(|bridge| bridge.force_flush());
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_clearBuffer(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_bridge().map(|bridge| bridge.clear_buffer());
    status_code(&mut env, result)
}

/// Returns: buffered record count, -1 on error
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_getBufferLength(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_bridge() {
        Ok(bridge) => bridge.buffer_len().min(jint::MAX as usize) as jint,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_getStatusJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let result = get_bridge().and_then(|bridge| bridge.status_json());
    string_result(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_getConfigJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let result = get_bridge().and_then(|bridge| bridge.config_json());
    string_result(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setConfigJson(
    mut env: JNIEnv,
    _class: JClass,
    json: JString,
) -> jint {
    let result = read_string(&mut env, &json)
        .and_then(|json| get_bridge().and_then(|bridge| bridge.set_config_json(&json)));
    status_code(&mut env, result)
}

/// Returns: JSON array of `{title, message}` raised since the last call
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_drainNotificationsJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let result = get_bridge().and_then(|bridge| bridge.drain_notifications_json());
    string_result(&mut env, result)
}

// Per-field settings

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setTrackingEnabled(
    mut env: JNIEnv,
    _class: JClass,
    enabled: jboolean,
) -> jint {
    let result = get_bridge()
        .and_then(|bridge| Ok(bridge.agent().set_tracking_enabled(enabled != JNI_FALSE)?));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setHighDensity(
    mut env: JNIEnv,
    _class: JClass,
    enabled: jboolean,
) -> jint {
    let result =
        get_bridge().and_then(|bridge| Ok(bridge.agent().set_high_density(enabled != JNI_FALSE)?));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setDebugNotifications(
    mut env: JNIEnv,
    _class: JClass,
    enabled: jboolean,
) -> jint {
    let result = get_bridge()
        .and_then(|bridge| Ok(bridge.agent().set_debug_notifications(enabled != JNI_FALSE)?));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setServerHost(
    mut env: JNIEnv,
    _class: JClass,
    host: JString,
) -> jint {
    let result = read_string(&mut env, &host)
        .and_then(|host| get_bridge().and_then(|bridge| Ok(bridge.agent().set_server_host(&host)?)));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setApiKey(
    mut env: JNIEnv,
    _class: JClass,
    key: JString,
) -> jint {
    let result = read_string(&mut env, &key)
        .and_then(|key| get_bridge().and_then(|bridge| Ok(bridge.agent().set_api_key(&key)?)));
    status_code(&mut env, result)
}

/// Accepts 5, 60, 120, 300 or 600; anything else throws IllegalArgumentException
#[no_mangle]
pub extern "C" fn Java_com_waypointdb_agent_NativeBridge_setMaxBufferSize(
    mut env: JNIEnv,
    _class: JClass,
    records: jint,
) -> jint {
    let result = usize::try_from(records)
        .map_err(|_| BridgeError::InvalidParameters(format!("negative buffer size {}", records)))
        .and_then(|records| {
            get_bridge().and_then(|bridge| Ok(bridge.agent().set_max_buffer_size(records)?))
        });
    status_code(&mut env, result)
}
