//! System location via GeoClue2 on the D-Bus system bus.

use std::future::Future;

use futures::{Stream, StreamExt};
use zbus::zvariant::OwnedObjectPath;
use zbus::{Connection, Proxy};

use crate::position::{PositionError, PositionOptions, PositionProvider, PositionReading};
use crate::types::Coordinate;

const GEOCLUE_SERVICE: &str = "org.freedesktop.GeoClue2";
const MANAGER_PATH: &str = "/org/freedesktop/GeoClue2/Manager";
const MANAGER_IFACE: &str = "org.freedesktop.GeoClue2.Manager";
const CLIENT_IFACE: &str = "org.freedesktop.GeoClue2.Client";
const LOCATION_IFACE: &str = "org.freedesktop.GeoClue2.Location";

/// GClueAccuracyLevel values
const ACCURACY_EXACT: u32 = 8;
const ACCURACY_CITY: u32 = 4;

/// Position provider backed by the GeoClue2 daemon.
#[derive(Debug, Clone)]
pub struct GeoClueProvider {
    desktop_id: String,
}

impl GeoClueProvider {
    /// `desktop_id` identifies the app to GeoClue's authorization agent.
    pub fn new(desktop_id: impl Into<String>) -> Self {
        Self {
            desktop_id: desktop_id.into(),
        }
    }

    async fn locate(&self, options: &PositionOptions) -> Result<PositionReading, PositionError> {
        let conn = Connection::system().await.map_err(|e| {
            tracing::debug!("System bus unavailable: {}", e);
            PositionError::PositionUnavailable
        })?;

        let manager = Proxy::new(&conn, GEOCLUE_SERVICE, MANAGER_PATH, MANAGER_IFACE)
            .await
            .map_err(classify)?;
        let client_path: OwnedObjectPath =
            manager.call("GetClient", &()).await.map_err(classify)?;

        let client = Proxy::new(&conn, GEOCLUE_SERVICE, client_path.as_str(), CLIENT_IFACE)
            .await
            .map_err(classify)?;

        client
            .set_property("DesktopId", self.desktop_id.as_str())
            .await
            .map_err(|e| classify(e.into()))?;
        let accuracy = if options.enable_high_accuracy {
            ACCURACY_EXACT
        } else {
            ACCURACY_CITY
        };
        client
            .set_property("RequestedAccuracyLevel", accuracy)
            .await
            .map_err(|e| classify(e.into()))?;

        // Subscribe before starting so the first update is not missed
        let mut updates = client
            .receive_signal("LocationUpdated")
            .await
            .map_err(classify)?;
        client.call::<_, _, ()>("Start", &()).await.map_err(classify)?;

        // Stop runs on every path that returns here. A caller that drops this
        // future mid-wait closes `conn`, and GeoClue releases clients whose
        // bus connection is gone.
        let reading = match next_location_path(&mut updates).await {
            Ok(path) => read_location(&conn, path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = client.call::<_, _, ()>("Stop", &()).await {
            tracing::debug!("GeoClue client stop failed: {}", e);
        }

        reading
    }
}

/// Wait for the first `LocationUpdated` that points at a real location object.
async fn next_location_path<S>(updates: &mut S) -> Result<OwnedObjectPath, PositionError>
where
    S: Stream<Item = zbus::Message> + Unpin,
{
    loop {
        let Some(msg) = updates.next().await else {
            return Err(PositionError::PositionUnavailable);
        };
        let (_old, new): (OwnedObjectPath, OwnedObjectPath) = msg
            .body()
            .deserialize()
            .map_err(|e| PositionError::Unknown(e.to_string()))?;
        if new.as_str() != "/" {
            return Ok(new);
        }
    }
}

impl PositionProvider for GeoClueProvider {
    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = Result<PositionReading, PositionError>> + Send {
        self.locate(options)
    }
}

async fn read_location(
    conn: &Connection,
    path: OwnedObjectPath,
) -> Result<PositionReading, PositionError> {
    let location = Proxy::new(conn, GEOCLUE_SERVICE, path.as_str(), LOCATION_IFACE)
        .await
        .map_err(classify)?;

    let latitude: f64 = location
        .get_property("Latitude")
        .await
        .map_err(|e| classify(e.into()))?;
    let longitude: f64 = location
        .get_property("Longitude")
        .await
        .map_err(|e| classify(e.into()))?;
    let accuracy: f64 = location
        .get_property("Accuracy")
        .await
        .map_err(|e| classify(e.into()))?;

    let coordinate = Coordinate::new(latitude, longitude).map_err(|e| {
        tracing::warn!("GeoClue returned an invalid coordinate: {}", e);
        PositionError::PositionUnavailable
    })?;

    tracing::info!("GeoClue location: {} (±{:.0} m)", coordinate, accuracy);
    Ok(PositionReading {
        coordinate,
        accuracy_meters: (accuracy.is_finite() && accuracy > 0.0).then_some(accuracy),
    })
}

fn classify(err: zbus::Error) -> PositionError {
    match &err {
        zbus::Error::MethodError(name, _, _) if name.as_str().ends_with("AccessDenied") => {
            PositionError::PermissionDenied
        }
        zbus::Error::MethodError(name, _, _)
            if name.as_str().ends_with("ServiceUnknown") || name.as_str().ends_with("NoReply") =>
        {
            PositionError::PositionUnavailable
        }
        _ => PositionError::Unknown(err.to_string()),
    }
}
