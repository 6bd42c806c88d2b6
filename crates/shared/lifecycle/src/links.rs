use crate::model::Iteration;
use crate::tables::MasterTables;
use plm_domain::content::IterationLink;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of following one link. Dangling links are reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LinkResolution {
    Resolved {
        link: IterationLink,
        /// Present when the viewer may read the target.
        title: Option<String>,
    },
    Dangling {
        link: IterationLink,
        warning: String,
    },
}

impl LinkResolution {
    #[must_use]
    pub const fn link(&self) -> &IterationLink {
        match self {
            Self::Resolved { link, .. } | Self::Dangling { link, .. } => link,
        }
    }

    #[must_use]
    pub const fn is_dangling(&self) -> bool {
        matches!(self, Self::Dangling { .. })
    }
}

/// Resolves every link of `iteration`; `readable` decides whether a target's title is shown.
pub(crate) fn resolve(
    tables: &MasterTables,
    iteration: &Iteration,
    readable: impl Fn(&crate::model::Master) -> bool,
) -> Vec<LinkResolution> {
    iteration
        .links
        .iter()
        .map(|link| {
            let target = tables.of(link.kind).get(&link.master_key());
            match target {
                Some(master) if master.iteration(link.iteration).is_some() => LinkResolution::Resolved {
                    link: link.clone(),
                    title: readable(&master).then(|| master.title.clone()),
                },
                Some(master) => dangling(link, format!("{} has {} iteration(s)", master.key, master.iteration_count())),
                None => dangling(link, "target master no longer exists".to_owned()),
            }
        })
        .collect()
}

fn dangling(link: &IterationLink, reason: String) -> LinkResolution {
    warn!(%link, %reason, "Dangling link");
    LinkResolution::Dangling { warning: format!("{link}: {reason}"), link: link.clone() }
}
