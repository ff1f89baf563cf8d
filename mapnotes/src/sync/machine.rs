//! Machine à états pure de la synchronisation
//!
//! ```text
//! IDLE --(frame change)--> FETCH_SCHEDULED --(délai)--> FETCHING --(réponse)--> IDLE
//! IDLE --(mutation)-----> SAVE_SCHEDULED  --(délai)--> SAVING   --(réponse)--> IDLE
//! ```
//!
//! Aucune horloge ni réseau ici : chaque événement produit une liste
//! d'effets que le moteur exécute. Règles supplémentaires :
//! - une mutation pendant la phase `RemoteApplyStart`..`RemoteApplyEnd`
//!   ne planifie pas de sauvegarde ;
//! - deux sauvegardes ne se chevauchent jamais ;
//! - une lecture attend la sauvegarde en cours (et force celle planifiée) ;
//! - une sauvegarde échouée reste due, sans minuteur : elle repart à la
//!   prochaine édition ou au prochain déplacement ;
//! - une réponse de lecture n'est appliquée que si son jeton est le dernier émis.

/// État de la lecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Scheduled,
    /// Échue mais bloquée par une sauvegarde
    Waiting,
    InFlight { token: u64 },
}

/// État de la sauvegarde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Scheduled,
    /// `dirty` : une mutation est arrivée pendant l'envoi
    InFlight { dirty: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Nouveau frame actif
    FrameChanged,
    /// Création ou modification locale
    LocalMutation,
    /// Suppression locale (réconciliée par son propre appel)
    LocalDelete,
    FetchDue,
    FetchFinished { token: u64, ok: bool },
    SaveDue,
    SaveFinished { ok: bool },
    RemoteApplyStart,
    RemoteApplyEnd,
    /// Sauvegarder immédiatement ce qui est planifié
    Flush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEffect {
    /// (Re)lancer le minuteur de lecture
    ScheduleFetch,
    /// (Re)lancer le minuteur de sauvegarde
    ScheduleSave,
    CancelSaveTimer,
    StartFetch { token: u64 },
    StartSave,
    /// Appliquer la réponse de lecture
    ApplyFetch { token: u64 },
    /// Réponse périmée : l'ignorer
    DiscardFetch { token: u64 },
}

/// Machine à états de la synchronisation d'un jeu d'annotations
#[derive(Debug, Clone)]
pub struct SyncMachine {
    fetch: FetchState,
    save: SaveState,
    applying_remote: bool,
    latest_token: u64,
}

impl Default for SyncMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMachine {
    pub fn new() -> Self {
        Self {
            fetch: FetchState::Idle,
            save: SaveState::Idle,
            applying_remote: false,
            latest_token: 0,
        }
    }

    pub fn fetch_state(&self) -> FetchState {
        self.fetch
    }

    pub fn save_state(&self) -> SaveState {
        self.save
    }

    pub fn is_applying_remote(&self) -> bool {
        self.applying_remote
    }

    pub fn latest_token(&self) -> u64 {
        self.latest_token
    }

    /// Ni lecture ni sauvegarde en attente ou en vol
    pub fn is_idle(&self) -> bool {
        self.fetch == FetchState::Idle && self.save == SaveState::Idle
    }

    /// Traite un événement et renvoie les effets à exécuter, dans l'ordre
    pub fn handle(&mut self, event: SyncEvent) -> Vec<SyncEffect> {
        match event {
            SyncEvent::FrameChanged => {
                // Toute lecture en vol devient périmée
                self.latest_token += 1;
                self.fetch = FetchState::Scheduled;
                vec![SyncEffect::ScheduleFetch]
            }

            SyncEvent::LocalMutation => {
                if self.applying_remote {
                    return Vec::new();
                }
                let mut effects = Vec::new();
                match self.save {
                    SaveState::Idle | SaveState::Scheduled => {
                        self.save = SaveState::Scheduled;
                        effects.push(SyncEffect::ScheduleSave);
                    }
                    SaveState::InFlight { .. } => {
                        self.save = SaveState::InFlight { dirty: true };
                    }
                }
                effects.extend(self.supersede_fetch());
                effects
            }

            SyncEvent::LocalDelete => {
                if self.applying_remote {
                    return Vec::new();
                }
                self.supersede_fetch()
            }

            SyncEvent::FetchDue => {
                if self.fetch != FetchState::Scheduled {
                    return Vec::new();
                }
                match self.save {
                    SaveState::Scheduled => {
                        self.fetch = FetchState::Waiting;
                        self.save = SaveState::InFlight { dirty: false };
                        vec![SyncEffect::CancelSaveTimer, SyncEffect::StartSave]
                    }
                    SaveState::InFlight { .. } => {
                        self.fetch = FetchState::Waiting;
                        Vec::new()
                    }
                    SaveState::Idle => self.start_fetch(),
                }
            }

            SyncEvent::FetchFinished { token, ok } => {
                if token != self.latest_token {
                    return vec![SyncEffect::DiscardFetch { token }];
                }
                if self.fetch == (FetchState::InFlight { token }) {
                    self.fetch = FetchState::Idle;
                }
                if ok {
                    vec![SyncEffect::ApplyFetch { token }]
                } else {
                    Vec::new()
                }
            }

            SyncEvent::SaveDue => {
                if self.save != SaveState::Scheduled {
                    return Vec::new();
                }
                self.save = SaveState::InFlight { dirty: false };
                vec![SyncEffect::StartSave]
            }

            SyncEvent::SaveFinished { ok: false } => {
                let dirty = matches!(self.save, SaveState::InFlight { dirty: true });
                self.save = SaveState::Scheduled;
                // Pas de relecture par-dessus des éditions non enregistrées
                if self.fetch == FetchState::Waiting {
                    self.fetch = FetchState::Idle;
                }
                if dirty {
                    vec![SyncEffect::ScheduleSave]
                } else {
                    Vec::new()
                }
            }

            SyncEvent::SaveFinished { ok: true } => {
                let dirty = matches!(self.save, SaveState::InFlight { dirty: true });
                if self.fetch == FetchState::Waiting {
                    if dirty {
                        self.save = SaveState::InFlight { dirty: false };
                        vec![SyncEffect::StartSave]
                    } else {
                        self.save = SaveState::Idle;
                        self.start_fetch()
                    }
                } else if dirty {
                    self.save = SaveState::Scheduled;
                    vec![SyncEffect::ScheduleSave]
                } else {
                    self.save = SaveState::Idle;
                    Vec::new()
                }
            }

            SyncEvent::RemoteApplyStart => {
                self.applying_remote = true;
                Vec::new()
            }

            SyncEvent::RemoteApplyEnd => {
                self.applying_remote = false;
                Vec::new()
            }

            SyncEvent::Flush => {
                if self.save != SaveState::Scheduled {
                    return Vec::new();
                }
                self.save = SaveState::InFlight { dirty: false };
                vec![SyncEffect::CancelSaveTimer, SyncEffect::StartSave]
            }
        }
    }

    fn start_fetch(&mut self) -> Vec<SyncEffect> {
        self.latest_token += 1;
        let token = self.latest_token;
        self.fetch = FetchState::InFlight { token };
        vec![SyncEffect::StartFetch { token }]
    }

    /// Une édition locale rend la lecture en vol périmée : on relira après
    /// la sauvegarde (ou après le délai si rien n'est à sauvegarder)
    fn supersede_fetch(&mut self) -> Vec<SyncEffect> {
        if !matches!(self.fetch, FetchState::InFlight { .. }) {
            return Vec::new();
        }
        self.latest_token += 1;
        if self.save == SaveState::Idle {
            self.fetch = FetchState::Scheduled;
            vec![SyncEffect::ScheduleFetch]
        } else {
            self.fetch = FetchState::Waiting;
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_cycle() {
        let mut m = SyncMachine::new();
        assert_eq!(m.handle(SyncEvent::FrameChanged), vec![SyncEffect::ScheduleFetch]);
        assert_eq!(m.fetch_state(), FetchState::Scheduled);

        let effects = m.handle(SyncEvent::FetchDue);
        let token = m.latest_token();
        assert_eq!(effects, vec![SyncEffect::StartFetch { token }]);

        assert_eq!(
            m.handle(SyncEvent::FetchFinished { token, ok: true }),
            vec![SyncEffect::ApplyFetch { token }]
        );
        assert!(m.is_idle());
    }

    #[test]
    fn test_save_cycle_and_rescheduling() {
        let mut m = SyncMachine::new();
        for _ in 0..3 {
            assert_eq!(m.handle(SyncEvent::LocalMutation), vec![SyncEffect::ScheduleSave]);
        }
        assert_eq!(m.handle(SyncEvent::SaveDue), vec![SyncEffect::StartSave]);
        assert_eq!(m.save_state(), SaveState::InFlight { dirty: false });
        assert!(m.handle(SyncEvent::SaveFinished { ok: true }).is_empty());
        assert!(m.is_idle());
    }

    #[test]
    fn test_remote_apply_suppresses_save() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::RemoteApplyStart);
        assert!(m.is_applying_remote());
        assert!(m.handle(SyncEvent::LocalMutation).is_empty());
        assert!(m.handle(SyncEvent::LocalDelete).is_empty());
        m.handle(SyncEvent::RemoteApplyEnd);
        assert!(!m.is_applying_remote());
        assert_eq!(m.save_state(), SaveState::Idle);
        assert_eq!(m.handle(SyncEvent::LocalMutation), vec![SyncEffect::ScheduleSave]);
    }

    #[test]
    fn test_saves_never_overlap() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::LocalMutation);
        m.handle(SyncEvent::SaveDue);
        // Mutation pendant l'envoi : pas de nouveau minuteur
        assert!(m.handle(SyncEvent::LocalMutation).is_empty());
        assert_eq!(m.save_state(), SaveState::InFlight { dirty: true });
        assert!(m.handle(SyncEvent::SaveDue).is_empty());
        // Replanifiée après la fin de l'envoi
        assert_eq!(m.handle(SyncEvent::SaveFinished { ok: true }), vec![SyncEffect::ScheduleSave]);
        assert_eq!(m.save_state(), SaveState::Scheduled);
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::FrameChanged);
        m.handle(SyncEvent::FetchDue);
        let first = m.latest_token();

        m.handle(SyncEvent::FrameChanged);
        assert_eq!(
            m.handle(SyncEvent::FetchFinished { token: first, ok: true }),
            vec![SyncEffect::DiscardFetch { token: first }]
        );
        assert_eq!(m.fetch_state(), FetchState::Scheduled);

        let effects = m.handle(SyncEvent::FetchDue);
        let second = m.latest_token();
        assert!(second > first);
        assert_eq!(effects, vec![SyncEffect::StartFetch { token: second }]);
    }

    #[test]
    fn test_due_fetch_flushes_scheduled_save() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::LocalMutation);
        m.handle(SyncEvent::FrameChanged);
        assert_eq!(
            m.handle(SyncEvent::FetchDue),
            vec![SyncEffect::CancelSaveTimer, SyncEffect::StartSave]
        );
        assert_eq!(m.fetch_state(), FetchState::Waiting);

        let effects = m.handle(SyncEvent::SaveFinished { ok: true });
        let token = m.latest_token();
        assert_eq!(effects, vec![SyncEffect::StartFetch { token }]);
        assert_eq!(m.save_state(), SaveState::Idle);
    }

    #[test]
    fn test_waiting_fetch_after_dirty_save() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::LocalMutation);
        m.handle(SyncEvent::SaveDue);
        m.handle(SyncEvent::FrameChanged);
        assert!(m.handle(SyncEvent::FetchDue).is_empty());
        m.handle(SyncEvent::LocalMutation);

        // Sauvegarde suivante immédiate, lecture toujours en attente
        assert_eq!(m.handle(SyncEvent::SaveFinished { ok: true }), vec![SyncEffect::StartSave]);
        assert_eq!(m.fetch_state(), FetchState::Waiting);
        assert!(matches!(
            m.handle(SyncEvent::SaveFinished { ok: true }).as_slice(),
            [SyncEffect::StartFetch { .. }]
        ));
    }

    #[test]
    fn test_mutation_supersedes_in_flight_fetch() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::FrameChanged);
        m.handle(SyncEvent::FetchDue);
        let token = m.latest_token();

        assert_eq!(m.handle(SyncEvent::LocalMutation), vec![SyncEffect::ScheduleSave]);
        assert_eq!(m.fetch_state(), FetchState::Waiting);
        assert_eq!(
            m.handle(SyncEvent::FetchFinished { token, ok: true }),
            vec![SyncEffect::DiscardFetch { token }]
        );
    }

    #[test]
    fn test_delete_supersedes_in_flight_fetch() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::FrameChanged);
        m.handle(SyncEvent::FetchDue);
        assert_eq!(m.handle(SyncEvent::LocalDelete), vec![SyncEffect::ScheduleFetch]);
        assert_eq!(m.fetch_state(), FetchState::Scheduled);
        assert_eq!(m.save_state(), SaveState::Idle);
    }

    #[test]
    fn test_failed_fetch_returns_to_idle() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::FrameChanged);
        m.handle(SyncEvent::FetchDue);
        let token = m.latest_token();
        assert!(m.handle(SyncEvent::FetchFinished { token, ok: false }).is_empty());
        assert!(m.is_idle());
    }

    #[test]
    fn test_flush() {
        let mut m = SyncMachine::new();
        assert!(m.handle(SyncEvent::Flush).is_empty());
        m.handle(SyncEvent::LocalMutation);
        assert_eq!(
            m.handle(SyncEvent::Flush),
            vec![SyncEffect::CancelSaveTimer, SyncEffect::StartSave]
        );
        // Le minuteur annulé qui se déclencherait quand même est ignoré
        assert!(m.handle(SyncEvent::SaveDue).is_empty());
    }

    #[test]
    fn test_failed_save_stays_pending() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::LocalMutation);
        m.handle(SyncEvent::SaveDue);
        assert!(m.handle(SyncEvent::SaveFinished { ok: false }).is_empty());
        assert_eq!(m.save_state(), SaveState::Scheduled);
        assert!(!m.is_idle());

        // Le déplacement suivant force d'abord la sauvegarde
        m.handle(SyncEvent::FrameChanged);
        assert_eq!(
            m.handle(SyncEvent::FetchDue),
            vec![SyncEffect::CancelSaveTimer, SyncEffect::StartSave]
        );
        assert!(matches!(
            m.handle(SyncEvent::SaveFinished { ok: true }).as_slice(),
            [SyncEffect::StartFetch { .. }]
        ));
    }

    #[test]
    fn test_failed_save_drops_waiting_fetch() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::LocalMutation);
        m.handle(SyncEvent::SaveDue);
        m.handle(SyncEvent::FrameChanged);
        assert!(m.handle(SyncEvent::FetchDue).is_empty());

        assert!(m.handle(SyncEvent::SaveFinished { ok: false }).is_empty());
        assert_eq!(m.fetch_state(), FetchState::Idle);
        assert_eq!(m.save_state(), SaveState::Scheduled);

        // Une édition relance le minuteur
        assert_eq!(m.handle(SyncEvent::LocalMutation), vec![SyncEffect::ScheduleSave]);
    }

    #[test]
    fn test_failed_dirty_save_rearms_timer() {
        let mut m = SyncMachine::new();
        m.handle(SyncEvent::LocalMutation);
        m.handle(SyncEvent::SaveDue);
        m.handle(SyncEvent::LocalMutation);
        assert_eq!(
            m.handle(SyncEvent::SaveFinished { ok: false }),
            vec![SyncEffect::ScheduleSave]
        );
        assert_eq!(m.save_state(), SaveState::Scheduled);
    }
}
